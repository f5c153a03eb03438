//! In-memory repository.

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use confluo_types::{ActionBinding, ActionTemplate, Provider, Workflow, WorkflowAction};
use indexmap::IndexMap;
use tracing::debug;
use uuid::Uuid;

use super::{Result, StoreError, WorkflowRepository};

#[derive(Debug, Default)]
struct State {
    providers: HashMap<String, Provider>,
    templates: IndexMap<String, ActionTemplate>,
    workflows: HashMap<String, Workflow>,
    /// Chain nodes in insertion order, across all workflows.
    nodes: IndexMap<String, WorkflowAction>,
}

impl State {
    fn binding_for(&self, template_id: &str) -> Option<(ActionBinding, ActionTemplate)> {
        let template = self.templates.get(template_id)?;
        let provider = self.providers.get(&template.provider_id)?;
        Some((
            ActionBinding {
                id: template.id.clone(),
                operation: template.operation.clone(),
                provider: provider.summary(),
            },
            template.clone(),
        ))
    }

    fn resolve_node(&self, node: &WorkflowAction) -> WorkflowAction {
        let mut resolved = node.clone();
        if let Some((binding, template)) = self.binding_for(&node.action_id) {
            resolved.kind = template.kind;
            resolved.action = Some(binding);
        } else {
            resolved.action = None;
        }
        resolved
    }

    fn template_referenced(&self, template_id: &str) -> bool {
        self.nodes.values().any(|node| node.action_id == template_id)
    }
}

/// Repository keeping every record in process memory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: RwLock<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_version(kind: &'static str, id: &str, expected: u32, stored: u32) -> Result<()> {
    if expected != stored {
        return Err(StoreError::EditConflict {
            kind,
            id: id.to_string(),
            expected,
            stored,
        });
    }
    Ok(())
}

fn require_non_empty(kind: &'static str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StoreError::invalid(kind, format!("{field} is required")));
    }
    Ok(())
}

#[async_trait]
impl WorkflowRepository for MemoryRepository {
    async fn insert_provider(&self, mut provider: Provider) -> Result<Provider> {
        require_non_empty("provider", "name", &provider.name)?;
        provider.id = Uuid::new_v4().to_string();
        provider.version = 1;
        provider.actions.clear();
        self.write().providers.insert(provider.id.clone(), provider.clone());
        debug!(provider_id = %provider.id, name = %provider.name, "provider inserted");
        Ok(provider)
    }

    async fn update_provider(&self, mut provider: Provider) -> Result<Provider> {
        require_non_empty("provider", "name", &provider.name)?;
        let mut state = self.write();
        let stored = state
            .providers
            .get_mut(&provider.id)
            .ok_or_else(|| StoreError::not_found("provider", &provider.id))?;
        check_version("provider", &provider.id, provider.version, stored.version)?;
        provider.version = stored.version + 1;
        provider.actions.clear();
        *stored = provider.clone();
        Ok(provider)
    }

    async fn get_provider(&self, id: &str) -> Result<Provider> {
        let state = self.read();
        let mut provider = state
            .providers
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("provider", id))?;
        provider.actions = state
            .templates
            .values()
            .filter(|template| template.provider_id == id)
            .cloned()
            .collect();
        Ok(provider)
    }

    async fn insert_action(&self, mut template: ActionTemplate) -> Result<ActionTemplate> {
        require_non_empty("action", "operation", &template.operation)?;
        let mut state = self.write();
        if !state.providers.contains_key(&template.provider_id) {
            return Err(StoreError::invalid(
                "action",
                format!("provider '{}' does not exist", template.provider_id),
            ));
        }
        template.id = Uuid::new_v4().to_string();
        template.version = 1;
        state.templates.insert(template.id.clone(), template.clone());
        debug!(action_id = %template.id, operation = %template.operation, "action template inserted");
        Ok(template)
    }

    async fn update_action(&self, mut template: ActionTemplate) -> Result<ActionTemplate> {
        require_non_empty("action", "operation", &template.operation)?;
        let mut state = self.write();
        if !state.providers.contains_key(&template.provider_id) {
            return Err(StoreError::invalid(
                "action",
                format!("provider '{}' does not exist", template.provider_id),
            ));
        }
        let referenced = state.template_referenced(&template.id);
        let stored = state
            .templates
            .get_mut(&template.id)
            .ok_or_else(|| StoreError::not_found("action", &template.id))?;
        check_version("action", &template.id, template.version, stored.version)?;
        if referenced {
            return Err(StoreError::invalid("action", "template is referenced by a workflow action"));
        }
        template.version = stored.version + 1;
        *stored = template.clone();
        Ok(template)
    }

    async fn insert_workflow(&self, mut workflow: Workflow) -> Result<Workflow> {
        require_non_empty("workflow", "user id", &workflow.user_id)?;
        require_non_empty("workflow", "name", &workflow.name)?;
        if !workflow.actions.is_empty() {
            return Err(StoreError::invalid("workflow", "chain nodes are inserted individually"));
        }
        workflow.id = Uuid::new_v4().to_string();
        workflow.version = 1;
        self.write().workflows.insert(workflow.id.clone(), workflow.clone());
        debug!(workflow_id = %workflow.id, user_id = %workflow.user_id, "workflow inserted");
        Ok(workflow)
    }

    async fn update_workflow(&self, mut workflow: Workflow) -> Result<Workflow> {
        require_non_empty("workflow", "user id", &workflow.user_id)?;
        require_non_empty("workflow", "name", &workflow.name)?;
        let mut state = self.write();
        let stored = state
            .workflows
            .get_mut(&workflow.id)
            .ok_or_else(|| StoreError::not_found("workflow", &workflow.id))?;
        check_version("workflow", &workflow.id, workflow.version, stored.version)?;
        workflow.version = stored.version + 1;
        workflow.actions.clear();
        *stored = workflow.clone();
        Ok(workflow)
    }

    async fn get_workflow(&self, id: &str) -> Result<Workflow> {
        let state = self.read();
        let mut workflow = state
            .workflows
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("workflow", id))?;
        workflow.actions = state
            .nodes
            .values()
            .filter(|node| node.workflow_id == id)
            .map(|node| state.resolve_node(node))
            .collect();
        Ok(workflow)
    }

    async fn list_workflows(&self, user_id: &str) -> Result<Vec<Workflow>> {
        let state = self.read();
        let mut workflows: Vec<Workflow> = state
            .workflows
            .values()
            .filter(|workflow| workflow.user_id == user_id)
            .cloned()
            .collect();
        workflows.sort_by(|left, right| left.name.cmp(&right.name).then_with(|| left.id.cmp(&right.id)));
        Ok(workflows)
    }

    async fn delete_workflow(&self, id: &str) -> Result<()> {
        let mut state = self.write();
        if state.workflows.remove(id).is_none() {
            return Err(StoreError::not_found("workflow", id));
        }
        let before = state.nodes.len();
        state.nodes.retain(|_, node| node.workflow_id != id);
        debug!(workflow_id = %id, removed_nodes = before - state.nodes.len(), "workflow deleted");
        Ok(())
    }

    async fn insert_workflow_action(&self, mut node: WorkflowAction) -> Result<WorkflowAction> {
        let mut state = self.write();
        if !state.workflows.contains_key(&node.workflow_id) {
            return Err(StoreError::invalid(
                "workflow action",
                format!("workflow '{}' does not exist", node.workflow_id),
            ));
        }
        if !state.templates.contains_key(&node.action_id) {
            return Err(StoreError::invalid(
                "workflow action",
                format!("action '{}' does not exist", node.action_id),
            ));
        }
        node.id = Uuid::new_v4().to_string();
        node.version = 1;
        node.action = None;
        state.nodes.insert(node.id.clone(), node.clone());
        Ok(state.resolve_node(&node))
    }

    async fn update_workflow_action(&self, mut node: WorkflowAction) -> Result<WorkflowAction> {
        let mut state = self.write();
        if !state.templates.contains_key(&node.action_id) {
            return Err(StoreError::invalid(
                "workflow action",
                format!("action '{}' does not exist", node.action_id),
            ));
        }
        let stored = state
            .nodes
            .get_mut(&node.id)
            .ok_or_else(|| StoreError::not_found("workflow action", &node.id))?;
        check_version("workflow action", &node.id, node.version, stored.version)?;
        if stored.workflow_id != node.workflow_id {
            return Err(StoreError::invalid("workflow action", "a node cannot move between workflows"));
        }
        node.version = stored.version + 1;
        node.action = None;
        *stored = node.clone();
        Ok(state.resolve_node(&node))
    }
}
