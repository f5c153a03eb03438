//! Index-addressed arena over one workflow's chain.
//!
//! Nodes live in a `Vec` and are addressed by [`NodeIndex`]; successor edges are stored per node
//! as a list so branching kinds can grow into it later, though the chain executor only ever
//! follows the first edge. All shape checks run once, in [`WorkflowGraph::build`], so traversal
//! never has to re-check ids or guard against cycles.

use std::collections::HashSet;

use indexmap::IndexMap;
use thiserror::Error;

use super::{ActionKind, Workflow, WorkflowAction};

/// Position of a node inside a [`WorkflowGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIndex(usize);

/// Shapes rejected while building a graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("workflow '{workflow}' has no trigger")]
    MissingTrigger { workflow: String },

    #[error("workflow '{workflow}' names trigger '{trigger}' which is not one of its actions")]
    UnknownTrigger { workflow: String, trigger: String },

    #[error("action id '{node}' appears more than once")]
    DuplicateNode { node: String },

    #[error("action '{node}' belongs to workflow '{owner}', not '{workflow}'")]
    ForeignNode { node: String, owner: String, workflow: String },

    #[error("action '{node}' points at unknown successor '{next}'")]
    DanglingSuccessor { node: String, next: String },

    #[error("cycle detected: action '{node}' is reached twice from the trigger")]
    Cycle { node: String },

    #[error("action '{node}' is not bound to a provider action")]
    UnboundAction { node: String },

    #[error("trigger '{node}' must be of kind trigger, found {kind}")]
    TriggerKind { node: String, kind: ActionKind },

    #[error("action '{node}' is a trigger but is not the chain entry point")]
    TriggerInChain { node: String },

    #[error("action '{node}' is conditional; branching is not supported by the chain executor")]
    ConditionalUnsupported { node: String },
}

/// Validated, read-only snapshot of one workflow's chain.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    workflow_id: String,
    name: String,
    nodes: Vec<WorkflowAction>,
    index: IndexMap<String, NodeIndex>,
    successors: Vec<Vec<NodeIndex>>,
    trigger: NodeIndex,
    chain_len: usize,
}

impl WorkflowGraph {
    /// Builds the arena and validates every invariant the executor relies on.
    ///
    /// Nodes that are not reachable from the trigger are kept (authors may park drafts) but still
    /// must reference existing successors inside the same workflow.
    pub fn build(workflow: Workflow) -> Result<Self, GraphError> {
        let Workflow {
            id: workflow_id,
            name,
            trigger_id,
            actions,
            ..
        } = workflow;

        let trigger_id = trigger_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GraphError::MissingTrigger {
                workflow: workflow_label(&workflow_id, &name),
            })?;

        // An id-less document is owned by the first node that names a workflow.
        let owner = if workflow_id.is_empty() {
            actions
                .iter()
                .map(|node| node.workflow_id.as_str())
                .find(|owner| !owner.is_empty())
                .unwrap_or_default()
                .to_string()
        } else {
            workflow_id.clone()
        };

        let mut index: IndexMap<String, NodeIndex> = IndexMap::with_capacity(actions.len());
        for (position, node) in actions.iter().enumerate() {
            if index.insert(node.id.clone(), NodeIndex(position)).is_some() {
                return Err(GraphError::DuplicateNode { node: node.id.clone() });
            }
            if !node.workflow_id.is_empty() && node.workflow_id != owner {
                return Err(GraphError::ForeignNode {
                    node: node.id.clone(),
                    owner: node.workflow_id.clone(),
                    workflow: owner.clone(),
                });
            }
        }

        let mut successors = Vec::with_capacity(actions.len());
        for node in &actions {
            let edges = match node.next_id() {
                Some(next) => {
                    let target = index.get(next).copied().ok_or_else(|| GraphError::DanglingSuccessor {
                        node: node.id.clone(),
                        next: next.to_string(),
                    })?;
                    vec![target]
                }
                None => Vec::new(),
            };
            successors.push(edges);
        }

        let trigger = index.get(&trigger_id).copied().ok_or_else(|| GraphError::UnknownTrigger {
            workflow: workflow_label(&workflow_id, &name),
            trigger: trigger_id.clone(),
        })?;

        let mut graph = Self {
            workflow_id,
            name,
            nodes: actions,
            index,
            successors,
            trigger,
            chain_len: 0,
        };
        graph.chain_len = graph.validate_chain()?;
        Ok(graph)
    }

    /// Walks the chain once from the trigger, rejecting cycles and unsupported node shapes.
    fn validate_chain(&self) -> Result<usize, GraphError> {
        let mut visited = HashSet::new();
        let mut cursor = Some(self.trigger);

        while let Some(position) = cursor {
            let node = self.node(position);
            if !visited.insert(position) {
                return Err(GraphError::Cycle { node: node.id.clone() });
            }
            if node.action.is_none() {
                return Err(GraphError::UnboundAction { node: node.id.clone() });
            }
            match (position == self.trigger, node.kind) {
                (true, ActionKind::Trigger) => {}
                (true, kind) => {
                    return Err(GraphError::TriggerKind {
                        node: node.id.clone(),
                        kind,
                    });
                }
                (false, ActionKind::Trigger) => return Err(GraphError::TriggerInChain { node: node.id.clone() }),
                (false, ActionKind::Conditional) => {
                    return Err(GraphError::ConditionalUnsupported { node: node.id.clone() });
                }
                (false, ActionKind::Operation) => {}
            }
            cursor = self.successor(position);
        }

        Ok(visited.len())
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trigger_index(&self) -> NodeIndex {
        self.trigger
    }

    pub fn trigger(&self) -> &WorkflowAction {
        self.node(self.trigger)
    }

    /// Node at `position`.
    ///
    /// # Panics
    ///
    /// Panics if `position` was not produced by this graph.
    pub fn node(&self, position: NodeIndex) -> &WorkflowAction {
        &self.nodes[position.0]
    }

    /// Looks a node up by its persisted id.
    pub fn get(&self, id: &str) -> Option<&WorkflowAction> {
        self.index.get(id).map(|position| self.node(*position))
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    /// The single successor the linear executor follows.
    ///
    /// # Panics
    ///
    /// Panics if `position` was not produced by this graph.
    pub fn successor(&self, position: NodeIndex) -> Option<NodeIndex> {
        self.successors[position.0].first().copied()
    }

    /// Number of nodes on the chain, trigger included.
    pub fn chain_len(&self) -> usize {
        self.chain_len
    }

    /// Total number of nodes in the arena, reachable or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates the chain in execution order, starting at the trigger.
    pub fn chain(&self) -> ChainIter<'_> {
        ChainIter {
            graph: self,
            cursor: Some(self.trigger),
        }
    }
}

/// Iterator returned by [`WorkflowGraph::chain`].
pub struct ChainIter<'a> {
    graph: &'a WorkflowGraph,
    cursor: Option<NodeIndex>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = &'a WorkflowAction;

    fn next(&mut self) -> Option<Self::Item> {
        let position = self.cursor?;
        self.cursor = self.graph.successor(position);
        Some(self.graph.node(position))
    }
}

fn workflow_label(id: &str, name: &str) -> String {
    if id.is_empty() { name.to_string() } else { id.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{ActionBinding, ProviderSummary};

    fn node(id: &str, kind: ActionKind, next: Option<&str>) -> WorkflowAction {
        WorkflowAction {
            id: id.into(),
            text: format!("step {id}"),
            workflow_id: "wf".into(),
            kind,
            action_id: format!("tpl-{id}"),
            action: Some(ActionBinding {
                id: format!("tpl-{id}"),
                operation: "Echo".into(),
                provider: ProviderSummary {
                    id: "p".into(),
                    name: "Test".into(),
                    logo: String::new(),
                },
            }),
            next_action_id: next.map(Into::into),
            ..Default::default()
        }
    }

    fn workflow(trigger: Option<&str>, actions: Vec<WorkflowAction>) -> Workflow {
        Workflow {
            id: "wf".into(),
            user_id: "user".into(),
            name: "demo".into(),
            trigger_id: trigger.map(Into::into),
            actions,
            version: 1,
        }
    }

    #[test]
    fn linear_chain_is_walked_in_successor_order() {
        let graph = WorkflowGraph::build(workflow(
            Some("a"),
            vec![
                node("c", ActionKind::Operation, None),
                node("a", ActionKind::Trigger, Some("b")),
                node("b", ActionKind::Operation, Some("c")),
            ],
        ))
        .expect("valid graph");

        let order: Vec<&str> = graph.chain().map(|node| node.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(graph.chain_len(), 3);
        assert_eq!(graph.trigger().id, "a");
        assert!(graph.successor(graph.index_of("c").expect("c")).is_none());
    }

    #[test]
    fn unreachable_nodes_are_kept_but_not_walked() {
        let graph = WorkflowGraph::build(workflow(
            Some("a"),
            vec![node("a", ActionKind::Trigger, None), node("draft", ActionKind::Operation, None)],
        ))
        .expect("valid graph");

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.chain_len(), 1);
        assert!(graph.get("draft").is_some());
    }

    #[test]
    fn missing_or_unknown_trigger_is_rejected() {
        let missing = WorkflowGraph::build(workflow(None, vec![node("a", ActionKind::Trigger, None)]));
        assert!(matches!(missing, Err(GraphError::MissingTrigger { .. })));

        let blank = WorkflowGraph::build(workflow(Some(" "), vec![node("a", ActionKind::Trigger, None)]));
        assert!(matches!(blank, Err(GraphError::MissingTrigger { .. })));

        let unknown = WorkflowGraph::build(workflow(Some("zzz"), vec![node("a", ActionKind::Trigger, None)]));
        assert!(matches!(unknown, Err(GraphError::UnknownTrigger { .. })));
    }

    #[test]
    fn cycles_are_rejected() {
        let result = WorkflowGraph::build(workflow(
            Some("a"),
            vec![
                node("a", ActionKind::Trigger, Some("b")),
                node("b", ActionKind::Operation, Some("c")),
                node("c", ActionKind::Operation, Some("b")),
            ],
        ));
        assert_eq!(result.unwrap_err(), GraphError::Cycle { node: "b".into() });
    }

    #[test]
    fn self_loop_on_trigger_is_a_cycle() {
        let result = WorkflowGraph::build(workflow(Some("a"), vec![node("a", ActionKind::Trigger, Some("a"))]));
        assert!(matches!(result, Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn dangling_successor_and_duplicates_are_rejected() {
        let dangling = WorkflowGraph::build(workflow(Some("a"), vec![node("a", ActionKind::Trigger, Some("missing"))]));
        assert_eq!(
            dangling.unwrap_err(),
            GraphError::DanglingSuccessor {
                node: "a".into(),
                next: "missing".into()
            }
        );

        let duplicate = WorkflowGraph::build(workflow(
            Some("a"),
            vec![node("a", ActionKind::Trigger, None), node("a", ActionKind::Operation, None)],
        ));
        assert!(matches!(duplicate, Err(GraphError::DuplicateNode { .. })));
    }

    #[test]
    fn nodes_from_another_workflow_are_rejected() {
        let mut foreign = node("b", ActionKind::Operation, None);
        foreign.workflow_id = "other".into();
        let result = WorkflowGraph::build(workflow(Some("a"), vec![node("a", ActionKind::Trigger, Some("b")), foreign]));
        assert!(matches!(result, Err(GraphError::ForeignNode { .. })));
    }

    #[test]
    fn id_less_workflow_rejects_nodes_claimed_by_different_workflows() {
        let mut first = node("a", ActionKind::Trigger, Some("b"));
        first.workflow_id = "wf-A".into();
        let mut second = node("b", ActionKind::Operation, None);
        second.workflow_id = "wf-B".into();
        let mut document = workflow(Some("a"), vec![first.clone(), second]);
        document.id = String::new();

        let result = WorkflowGraph::build(document);
        assert_eq!(
            result.err(),
            Some(GraphError::ForeignNode {
                node: "b".into(),
                owner: "wf-B".into(),
                workflow: "wf-A".into(),
            })
        );

        let mut unowned = node("b", ActionKind::Operation, None);
        unowned.workflow_id = String::new();
        let mut document = workflow(Some("a"), vec![first, unowned]);
        document.id = String::new();
        assert!(WorkflowGraph::build(document).is_ok());
    }

    #[test]
    #[should_panic]
    fn index_from_another_graph_is_out_of_bounds() {
        let large = WorkflowGraph::build(workflow(
            Some("a"),
            vec![
                node("a", ActionKind::Trigger, Some("b")),
                node("b", ActionKind::Operation, Some("c")),
                node("c", ActionKind::Operation, None),
            ],
        ))
        .expect("valid graph");
        let small = WorkflowGraph::build(workflow(Some("a"), vec![node("a", ActionKind::Trigger, None)])).expect("valid graph");

        let foreign = large.index_of("c").expect("c");
        let _ = small.node(foreign);
    }

    #[test]
    fn node_kinds_are_checked_along_the_chain() {
        let wrong_entry = WorkflowGraph::build(workflow(Some("a"), vec![node("a", ActionKind::Operation, None)]));
        assert!(matches!(wrong_entry, Err(GraphError::TriggerKind { .. })));

        let second_trigger = WorkflowGraph::build(workflow(
            Some("a"),
            vec![node("a", ActionKind::Trigger, Some("b")), node("b", ActionKind::Trigger, None)],
        ));
        assert!(matches!(second_trigger, Err(GraphError::TriggerInChain { .. })));

        let conditional = WorkflowGraph::build(workflow(
            Some("a"),
            vec![node("a", ActionKind::Trigger, Some("b")), node("b", ActionKind::Conditional, None)],
        ));
        assert!(matches!(conditional, Err(GraphError::ConditionalUnsupported { .. })));
    }

    #[test]
    fn unbound_reachable_node_is_rejected() {
        let mut unbound = node("b", ActionKind::Operation, None);
        unbound.action = None;
        let result = WorkflowGraph::build(workflow(Some("a"), vec![node("a", ActionKind::Trigger, Some("b")), unbound]));
        assert_eq!(result.unwrap_err(), GraphError::UnboundAction { node: "b".into() });
    }
}
