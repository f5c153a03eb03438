//! Shared type definitions for Confluo.
//!
//! - [`workflow`]: persisted records (providers, action templates, chain nodes, workflows)
//!   and the validated [`WorkflowGraph`] arena the executor walks.
//! - [`run`]: runtime status, lifecycle events, and the final run report.
//!
//! The parameter bag threaded through a chain is an open JSON object; see [`Params`].

use serde_json::{Map, Value};

pub mod run;
pub mod workflow;

pub use run::{FailureCategory, RunEvent, RunFailure, RunReport, RunStatus};
pub use workflow::{
    ActionBinding, ActionKind, ActionTemplate, GraphError, NodeIndex, Provider, ProviderSummary, Workflow, WorkflowAction, WorkflowGraph,
};

/// Schema-less key/value bag threaded from node to node during a run.
pub type Params = Map<String, Value>;
