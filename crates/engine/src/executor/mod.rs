//! Chain executor: polls a workflow's trigger and then walks its chain node by node.
//!
//! - `trigger`: polling loop for the entry node
//! - `step`: single node invocation with configured params merged in
//!
//! One [`ChainExecutor::drive`] call moves a run through
//! `Idle -> Polling -> Running -> Completed | Failed | Canceled`. The first error returned by a
//! node ends the run; nodes after it are never invoked and nothing is retried or rolled back.

mod step;
mod trigger;

use std::{fmt, sync::Arc, time::Duration};

use chrono::Utc;
use confluo_types::{Params, RunEvent, RunFailure, RunReport, RunStatus, WorkflowGraph};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{config::DEFAULT_POLL_INTERVAL, provider::Dispatcher};

use step::{StepOutcome, run_node};
use trigger::{PollOutcome, poll_trigger};

/// Tunables for one executor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Sleep between trigger polls that return not-triggered.
    pub poll_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Forwards lifecycle events to an optional channel. A dropped receiver is ignored.
pub(crate) struct EventSink<'a> {
    sender: Option<&'a UnboundedSender<RunEvent>>,
}

impl<'a> EventSink<'a> {
    pub(crate) fn new(sender: Option<&'a UnboundedSender<RunEvent>>) -> Self {
        Self { sender }
    }

    pub(crate) fn emit(&self, event: RunEvent) {
        if let Some(sender) = self.sender {
            let _ = sender.send(event);
        }
    }
}

/// Runs validated workflow graphs against a [`Dispatcher`].
#[derive(Clone)]
pub struct ChainExecutor {
    dispatcher: Arc<dyn Dispatcher>,
    config: ExecutorConfig,
}

impl fmt::Debug for ChainExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainExecutor").field("config", &self.config).finish()
    }
}

impl ChainExecutor {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, config: ExecutorConfig) -> Self {
        Self { dispatcher, config }
    }

    /// Runs `graph` to a terminal state with a fresh run id and no external cancellation.
    ///
    /// A trigger that never fires keeps this future pending; callers that need a bound should
    /// use [`ChainExecutor::drive`] with their own token, or schedule through
    /// [`RunScheduler`](crate::RunScheduler).
    pub async fn execute(&self, graph: &WorkflowGraph, params: Params) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        self.drive(&run_id, graph, params, &CancellationToken::new(), None).await
    }

    /// Drives one run of `graph`, starting from `params`.
    ///
    /// `cancel` is honored before every poll, while sleeping between polls, and between chain
    /// nodes. An in-flight action call is always allowed to finish.
    pub async fn drive(
        &self,
        run_id: &str,
        graph: &WorkflowGraph,
        params: Params,
        cancel: &CancellationToken,
        events: Option<&UnboundedSender<RunEvent>>,
    ) -> RunReport {
        let sink = EventSink::new(events);
        let mut report = RunReport {
            run_id: run_id.to_string(),
            workflow_id: graph.workflow_id().to_string(),
            status: RunStatus::Idle,
            params: Params::new(),
            failure: None,
            visited: Vec::new(),
            poll_attempts: 0,
        };

        sink.emit(RunEvent::RunStarted {
            run_id: run_id.to_string(),
            workflow_id: graph.workflow_id().to_string(),
            at: Utc::now(),
        });
        info!(
            run_id = %run_id,
            workflow_id = %graph.workflow_id(),
            chain_len = graph.chain_len(),
            "run started"
        );

        report.status = RunStatus::Polling;
        let trigger_node = graph.trigger();
        let polled = poll_trigger(
            self.dispatcher.as_ref(),
            trigger_node,
            &params,
            self.config.poll_interval,
            cancel,
            &sink,
        )
        .await;
        report.poll_attempts = polled.attempts;

        let mut current = match polled.outcome {
            PollOutcome::Fired(output) => output,
            PollOutcome::Failed { failure, params } => {
                report.params = params;
                return finish(report, RunStatus::Failed, Some(failure), &sink);
            }
            PollOutcome::Canceled => {
                report.params = params;
                return finish(report, RunStatus::Canceled, None, &sink);
            }
        };
        report.visited.push(trigger_node.id.clone());
        sink.emit(RunEvent::Triggered {
            node_id: trigger_node.id.clone(),
            attempts: polled.attempts,
        });

        report.status = RunStatus::Running;
        let mut cursor = graph.successor(graph.trigger_index());
        while let Some(position) = cursor {
            if cancel.is_cancelled() {
                report.params = current;
                return finish(report, RunStatus::Canceled, None, &sink);
            }

            let node = graph.node(position);
            match run_node(self.dispatcher.as_ref(), node, &current, &sink).await {
                StepOutcome::Succeeded(output) => {
                    current = output;
                    report.visited.push(node.id.clone());
                }
                StepOutcome::Failed { failure, params } => {
                    report.params = params;
                    return finish(report, RunStatus::Failed, Some(failure), &sink);
                }
            }
            cursor = graph.successor(position);
        }

        report.params = current;
        finish(report, RunStatus::Completed, None, &sink)
    }
}

fn finish(mut report: RunReport, status: RunStatus, failure: Option<RunFailure>, sink: &EventSink<'_>) -> RunReport {
    report.status = status;
    report.failure = failure;
    sink.emit(RunEvent::RunFinished {
        status,
        finished_at: Utc::now(),
        failure: report.failure.clone(),
    });
    match status {
        RunStatus::Failed => warn!(
            run_id = %report.run_id,
            node_id = report.failure.as_ref().map(|failure| failure.node_id.as_str()).unwrap_or_default(),
            visited = report.visited.len(),
            "run failed"
        ),
        _ => info!(
            run_id = %report.run_id,
            status = ?status,
            visited = report.visited.len(),
            poll_attempts = report.poll_attempts,
            "run finished"
        ),
    }
    report
}
