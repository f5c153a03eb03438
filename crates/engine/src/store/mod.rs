//! Persistence collaborator for workflow graphs.
//!
//! - `memory`: in-process [`MemoryRepository`] used by tests and the CLI
//!
//! Records are created by explicit insert, changed only through compare-and-swap updates on
//! `version`, and a workflow delete cascades to its chain nodes. The chain executor never calls
//! into a repository; callers load a graph snapshot with [`load_graph`] and hand it over.

mod memory;

pub use memory::MemoryRepository;

use async_trait::async_trait;
use confluo_types::{ActionTemplate, GraphError, Provider, Workflow, WorkflowAction, WorkflowGraph};
use thiserror::Error;

/// Errors from repository operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("edit conflict on {kind} '{id}': expected version {expected}, stored version is {stored}")]
    EditConflict {
        kind: &'static str,
        id: String,
        expected: u32,
        stored: u32,
    },

    #[error("invalid {kind}: {reason}")]
    Invalid { kind: &'static str, reason: String },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    pub fn invalid(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            kind,
            reason: reason.into(),
        }
    }

    pub fn is_edit_conflict(&self) -> bool {
        matches!(self, Self::EditConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Versioned storage for providers, action templates, workflows and their chain nodes.
///
/// Inserts assign a fresh id and version 1 and return the stored record. Updates require the
/// caller's `version` to equal the stored one and bump it by exactly one.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn insert_provider(&self, provider: Provider) -> Result<Provider>;

    async fn update_provider(&self, provider: Provider) -> Result<Provider>;

    /// Provider with its action templates attached.
    async fn get_provider(&self, id: &str) -> Result<Provider>;

    async fn insert_action(&self, template: ActionTemplate) -> Result<ActionTemplate>;

    /// Rejected once any chain node references the template.
    async fn update_action(&self, template: ActionTemplate) -> Result<ActionTemplate>;

    /// Stores the workflow header. Chain nodes are inserted individually.
    async fn insert_workflow(&self, workflow: Workflow) -> Result<Workflow>;

    /// Updates name, owner and trigger; chain nodes are left untouched.
    async fn update_workflow(&self, workflow: Workflow) -> Result<Workflow>;

    /// Workflow with its chain nodes and their resolved action/provider bindings.
    async fn get_workflow(&self, id: &str) -> Result<Workflow>;

    async fn list_workflows(&self, user_id: &str) -> Result<Vec<Workflow>>;

    /// Deletes the workflow and every chain node it owns.
    async fn delete_workflow(&self, id: &str) -> Result<()>;

    async fn insert_workflow_action(&self, node: WorkflowAction) -> Result<WorkflowAction>;

    async fn update_workflow_action(&self, node: WorkflowAction) -> Result<WorkflowAction>;
}

/// Loads a workflow and validates it into an executable graph snapshot.
pub async fn load_graph(repository: &dyn WorkflowRepository, workflow_id: &str) -> Result<WorkflowGraph> {
    let workflow = repository.get_workflow(workflow_id).await?;
    Ok(WorkflowGraph::build(workflow)?)
}
