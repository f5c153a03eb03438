//! Single chain node execution.

use std::time::Instant;

use chrono::Utc;
use confluo_types::{Params, RunEvent, RunFailure, WorkflowAction};
use tracing::{info, warn};

use super::{EventSink, trigger::failure_for};
use crate::{error::ActionError, params::merge_params, provider::Dispatcher};

#[derive(Debug)]
pub(crate) enum StepOutcome {
    Succeeded(Params),
    /// `params` is the merged bag the node was handed.
    Failed { failure: RunFailure, params: Params },
}

/// Provider and action names a node is bound to.
pub(crate) fn binding_of(node: &WorkflowAction) -> Result<(&str, &str), ActionError> {
    node.action
        .as_ref()
        .map(|binding| (binding.provider.name.as_str(), binding.operation.as_str()))
        .ok_or_else(|| ActionError::configuration("action", format!("node '{}' is not bound to a provider action", node.id)))
}

/// Runs `node` once with its configured params merged under the runtime bag.
pub(crate) async fn run_node(dispatcher: &dyn Dispatcher, node: &WorkflowAction, params: &Params, sink: &EventSink<'_>) -> StepOutcome {
    let input = merge_params(params, &node.params);
    let (provider, action) = match binding_of(node) {
        Ok(target) => target,
        Err(error) => {
            let failure = failure_for(node, &error);
            sink.emit(RunEvent::NodeFailed {
                node_id: node.id.clone(),
                failure: failure.clone(),
            });
            return StepOutcome::Failed { failure, params: input };
        }
    };

    sink.emit(RunEvent::NodeStarted {
        node_id: node.id.clone(),
        provider: provider.to_string(),
        action: action.to_string(),
        started_at: Utc::now(),
    });
    info!(node_id = %node.id, provider = %provider, action = %action, "node started");

    let started_at = Instant::now();
    let result = dispatcher.execute(provider, action, &input).await;
    let duration_ms = started_at.elapsed().as_millis().try_into().unwrap_or(u64::MAX);

    match result {
        Ok(output) => {
            sink.emit(RunEvent::NodeSucceeded {
                node_id: node.id.clone(),
                duration_ms,
            });
            info!(node_id = %node.id, duration_ms, "node succeeded");
            StepOutcome::Succeeded(output)
        }
        Err(error) => {
            let failure = failure_for(node, &error);
            warn!(node_id = %node.id, duration_ms, category = ?failure.category, error = %error, "node failed");
            sink.emit(RunEvent::NodeFailed {
                node_id: node.id.clone(),
                failure: failure.clone(),
            });
            StepOutcome::Failed { failure, params: input }
        }
    }
}
