//! Persisted workflow records and the chain graph built from them.
//!
//! A [`Workflow`] names its entry node through `trigger_id`; every [`WorkflowAction`] optionally
//! points at its successor through `next_action_id`. The records are plain serde structs so a
//! persistence collaborator (or a JSON/YAML document) can hand them to the engine unchanged.
//! [`WorkflowGraph`] turns one loaded workflow into an index-addressed arena and rejects shapes
//! the linear chain executor cannot run.

use serde::{Deserialize, Serialize};

use crate::Params;

mod graph;

pub use graph::{ChainIter, GraphError, NodeIndex, WorkflowGraph};

/// Role an action plays inside a chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Polled entry point; fires when an external condition occurs.
    Trigger,
    /// Regular step executed once per run.
    #[default]
    Operation,
    /// Reserved for branching. The linear executor rejects it.
    Conditional,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Trigger => "trigger",
            ActionKind::Operation => "operation",
            ActionKind::Conditional => "conditional",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External integration surface owning a set of action templates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub logo: String,
    /// Templates owned by this provider, when loaded together with it.
    #[serde(default)]
    pub actions: Vec<ActionTemplate>,
    #[serde(default)]
    pub version: u32,
}

impl Provider {
    pub fn summary(&self) -> ProviderSummary {
        ProviderSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            logo: self.logo.clone(),
        }
    }
}

/// Provider-defined operation descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActionTemplate {
    #[serde(default)]
    pub id: String,
    /// Operation name the provider registered, e.g. `New Issue`.
    pub operation: String,
    pub provider_id: String,
    #[serde(default)]
    pub kind: ActionKind,
    #[serde(default)]
    pub version: u32,
}

/// Provider identity as resolved onto a chain node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub logo: String,
}

/// Action template reference resolved onto a chain node, including its provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActionBinding {
    #[serde(default)]
    pub id: String,
    pub operation: String,
    pub provider: ProviderSummary,
}

/// A configured chain step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowAction {
    pub id: String,
    /// Label shown to the workflow author.
    #[serde(default)]
    pub text: String,
    /// Owning workflow. Empty when the node is embedded in a workflow document.
    #[serde(default)]
    pub workflow_id: String,
    #[serde(rename = "type", default)]
    pub kind: ActionKind,
    #[serde(default)]
    pub action_id: String,
    /// Resolved template and provider; required for every node reachable from the trigger.
    #[serde(default)]
    pub action: Option<ActionBinding>,
    /// Successor node. `None` and the empty string both end the chain.
    #[serde(default)]
    pub next_action_id: Option<String>,
    /// Static configuration merged into the runtime bag before the node runs.
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub version: u32,
}

impl WorkflowAction {
    /// Successor id with empty strings normalized away.
    pub fn next_id(&self) -> Option<&str> {
        self.next_action_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }
}

/// A user's automation: one trigger and the chain hanging off it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub trigger_id: Option<String>,
    #[serde(default)]
    pub actions: Vec<WorkflowAction>,
    #[serde(default)]
    pub version: u32,
}
