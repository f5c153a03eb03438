//! # Confluo Engine
//!
//! Action dispatch and chain execution for Confluo workflows. A workflow is a polled trigger
//! followed by a linked chain of actions; each action's output parameters feed the next.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use confluo_engine::{ActionError, ActionSet, ChainExecutor, ExecutorConfig, ProviderRegistry, action_fn};
//!
//! let registry = ProviderRegistry::new();
//! registry.subscribe(
//!     "Clock",
//!     ActionSet::new()
//!         .trigger("Tick", action_fn(|_| async { Err(ActionError::NotTriggered) }))
//!         .operation("Log", action_fn(|params| async move { Ok(params) })),
//! );
//! let executor = ChainExecutor::new(Arc::new(registry), ExecutorConfig::default());
//! # let _ = executor;
//! ```
//!
//! ## Architecture
//!
//! - **`provider`**: the [`Action`] capability, [`ActionSet`] builder and [`ProviderRegistry`] dispatcher
//! - **`executor`**: trigger polling and chain traversal ([`ChainExecutor`])
//! - **`workflow`**: bounded pool of concurrent runs ([`RunScheduler`])
//! - **`store`**: versioned persistence collaborator ([`WorkflowRepository`], [`MemoryRepository`])
//! - **`config`**: engine settings loaded from `engine.json`
//! - **`params`**: typed accessors actions use to validate their inputs

use std::{fs, path::Path};

use anyhow::{Context, Result};
use confluo_types::{Workflow, WorkflowGraph};

pub mod config;
pub mod error;
pub mod executor;
pub mod params;
pub mod provider;
pub mod store;
pub mod workflow;

pub use config::{ConfigError, EngineConfig, load_config, load_config_from_path, parse_interval};
pub use error::{ActionError, ActionResult, SchedulerError};
pub use executor::{ChainExecutor, ExecutorConfig};
pub use params::{merge_params, optional_str, require_str, require_u64};
pub use provider::{Action, ActionFn, ActionSet, Dispatcher, ProviderDescription, ProviderRegistry, action_fn};
pub use store::{MemoryRepository, StoreError, WorkflowRepository, load_graph};
pub use workflow::{RunHandle, RunScheduler};

/// Loads a workflow document from the filesystem.
///
/// Files ending in `.json` are parsed as JSON; everything else is parsed as YAML.
pub fn parse_workflow_file(file_path: impl AsRef<Path>) -> Result<Workflow> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read workflow file: {}", file_path.display()))?;

    let is_json = file_path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

    let workflow = if is_json {
        serde_json::from_str::<Workflow>(&content).with_context(|| format!("Invalid JSON workflow document: {}", file_path.display()))?
    } else {
        serde_yaml::from_str::<Workflow>(&content).with_context(|| format!("Invalid YAML workflow document: {}", file_path.display()))?
    };
    Ok(workflow)
}

/// Loads a workflow document and validates it into an executable graph.
pub fn load_workflow_graph(file_path: impl AsRef<Path>) -> Result<WorkflowGraph> {
    let file_path = file_path.as_ref();
    let workflow = parse_workflow_file(file_path)?;
    WorkflowGraph::build(workflow).with_context(|| format!("Invalid workflow graph in {}", file_path.display()))
}
