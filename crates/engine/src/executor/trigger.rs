//! Trigger polling.
//!
//! The trigger node is invoked repeatedly until it returns something other than
//! [`ActionError::NotTriggered`]. There is no attempt cap: a trigger whose condition never
//! occurs is polled until the run's cancellation token fires. Cancellation is observed before
//! each attempt and during the sleep between attempts, never in the middle of a call.

use std::time::Duration;

use confluo_types::{Params, RunEvent, RunFailure, WorkflowAction};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EventSink, step::binding_of};
use crate::{error::ActionError, params::merge_params, provider::Dispatcher};

/// How a polling loop ended.
#[derive(Debug)]
pub(crate) enum PollOutcome {
    /// The trigger returned a bag; the chain continues with it.
    Fired(Params),
    /// The trigger returned a real error; `params` is the bag the trigger was called with.
    Failed { failure: RunFailure, params: Params },
    Canceled,
}

#[derive(Debug)]
pub(crate) struct PollResult {
    pub(crate) outcome: PollOutcome,
    pub(crate) attempts: u64,
}

pub(crate) async fn poll_trigger(
    dispatcher: &dyn Dispatcher,
    trigger: &WorkflowAction,
    params: &Params,
    interval: Duration,
    cancel: &CancellationToken,
    sink: &EventSink<'_>,
) -> PollResult {
    let input = merge_params(params, &trigger.params);
    let (provider, action) = match binding_of(trigger) {
        Ok(target) => target,
        Err(error) => {
            return PollResult {
                outcome: PollOutcome::Failed {
                    failure: failure_for(trigger, &error),
                    params: input,
                },
                attempts: 0,
            };
        }
    };

    info!(
        node_id = %trigger.id,
        provider = %provider,
        action = %action,
        interval_ms = interval.as_millis(),
        "trigger polling started"
    );

    let mut attempts = 0u64;
    loop {
        if cancel.is_cancelled() {
            info!(node_id = %trigger.id, attempts, "trigger polling canceled");
            return PollResult {
                outcome: PollOutcome::Canceled,
                attempts,
            };
        }

        attempts += 1;
        match dispatcher.execute(provider, action, &input).await {
            Ok(output) => {
                sink.emit(RunEvent::PollAttempted { attempt: attempts, triggered: true });
                info!(node_id = %trigger.id, attempts, "trigger fired");
                return PollResult {
                    outcome: PollOutcome::Fired(output),
                    attempts,
                };
            }
            Err(ActionError::NotTriggered) => {
                sink.emit(RunEvent::PollAttempted {
                    attempt: attempts,
                    triggered: false,
                });
                debug!(node_id = %trigger.id, attempts, "trigger not fired; waiting");
            }
            Err(error) => {
                warn!(node_id = %trigger.id, attempts, error = %error, "trigger failed");
                return PollResult {
                    outcome: PollOutcome::Failed {
                        failure: failure_for(trigger, &error),
                        params: input,
                    },
                    attempts,
                };
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                info!(node_id = %trigger.id, attempts, "trigger polling canceled");
                return PollResult {
                    outcome: PollOutcome::Canceled,
                    attempts,
                };
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

pub(crate) fn failure_for(node: &WorkflowAction, error: &ActionError) -> RunFailure {
    RunFailure {
        node_id: node.id.clone(),
        category: error.category(),
        message: error.to_string(),
    }
}
