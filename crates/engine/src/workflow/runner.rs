//! Bounded pool of concurrently executing chain runs.
//!
//! Each started run becomes one Tokio task that waits for a semaphore permit and then drives
//! the chain through [`ChainExecutor::drive`]. Runs never share parameter bags. Every run owns
//! a child of the scheduler's root cancellation token, so a single run, every run of one
//! workflow, or the whole pool can be stopped at the next poll boundary.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::Utc;
use confluo_types::{Params, RunEvent, RunReport, RunStatus, WorkflowGraph};
use tokio::{
    sync::{Semaphore, mpsc::UnboundedSender},
    task::JoinHandle,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{error::SchedulerError, executor::ChainExecutor};

#[derive(Debug, Clone)]
struct ActiveRun {
    workflow_id: String,
    cancel: CancellationToken,
}

type ActiveRuns = Arc<Mutex<HashMap<String, ActiveRun>>>;

/// Removes a run from the active table when its task ends, unwinding included.
struct ActiveRunGuard {
    runs: ActiveRuns,
    run_id: String,
}

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        lock(&self.runs).remove(&self.run_id);
    }
}

/// Schedules workflow runs onto a bounded number of concurrently executing tasks.
#[derive(Clone)]
pub struct RunScheduler {
    executor: ChainExecutor,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    tracker: TaskTracker,
    root: CancellationToken,
    runs: ActiveRuns,
}

impl fmt::Debug for RunScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunScheduler")
            .field("max_concurrent", &self.max_concurrent)
            .field("active_runs", &lock(&self.runs).len())
            .finish()
    }
}

/// Handle to one scheduled run.
#[derive(Debug)]
pub struct RunHandle {
    run_id: String,
    workflow_id: String,
    task: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Waits for the run to reach a terminal state.
    pub async fn join(self) -> Result<RunReport, SchedulerError> {
        let run_id = self.run_id;
        self.task.await.map_err(|error| SchedulerError::RunAborted {
            run_id,
            reason: error.to_string(),
        })
    }
}

impl RunScheduler {
    /// Creates a pool running at most `max_concurrent` chains at a time (minimum one).
    pub fn new(executor: ChainExecutor, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            executor,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            tracker: TaskTracker::new(),
            root: CancellationToken::new(),
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Starts one run of `graph` with its own copy of `params`.
    pub fn start(&self, graph: Arc<WorkflowGraph>, params: Params) -> RunHandle {
        self.spawn(graph, params, None)
    }

    /// Starts one run and forwards its lifecycle events to `events`.
    pub fn start_observed(&self, graph: Arc<WorkflowGraph>, params: Params, events: UnboundedSender<RunEvent>) -> RunHandle {
        self.spawn(graph, params, Some(events))
    }

    /// Requests cancellation of one run. Returns `false` when the run is unknown or already finished.
    pub fn cancel(&self, run_id: &str) -> bool {
        match lock(&self.runs).get(run_id) {
            Some(run) => {
                run.cancel.cancel();
                info!(run_id = %run_id, "run cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Cancels every active run of `workflow_id`, e.g. when the workflow is disabled or deleted.
    pub fn cancel_workflow(&self, workflow_id: &str) -> usize {
        let runs = lock(&self.runs);
        let mut canceled = 0;
        for run in runs.values().filter(|run| run.workflow_id == workflow_id) {
            run.cancel.cancel();
            canceled += 1;
        }
        info!(workflow_id = %workflow_id, canceled, "workflow runs cancellation requested");
        canceled
    }

    /// Ids of runs that have been started and have not yet finished, sorted.
    pub fn active_runs(&self) -> Vec<String> {
        let mut run_ids: Vec<String> = lock(&self.runs).keys().cloned().collect();
        run_ids.sort();
        run_ids
    }

    /// Cancels every run and waits for all tasks to finish.
    ///
    /// Runs started afterwards are canceled before they poll.
    pub async fn shutdown(&self) {
        info!(active_runs = lock(&self.runs).len(), "scheduler shutting down");
        self.root.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("scheduler stopped");
    }

    fn spawn(&self, graph: Arc<WorkflowGraph>, params: Params, events: Option<UnboundedSender<RunEvent>>) -> RunHandle {
        let run_id = Uuid::new_v4().to_string();
        let workflow_id = graph.workflow_id().to_string();
        let cancel = self.root.child_token();
        lock(&self.runs).insert(
            run_id.clone(),
            ActiveRun {
                workflow_id: workflow_id.clone(),
                cancel: cancel.clone(),
            },
        );

        let executor = self.executor.clone();
        let permits = Arc::clone(&self.permits);
        let runs = Arc::clone(&self.runs);
        let task_run_id = run_id.clone();
        debug!(run_id = %run_id, workflow_id = %workflow_id, "run queued");

        let task = self.tracker.spawn(async move {
            let _active = ActiveRunGuard {
                runs,
                run_id: task_run_id.clone(),
            };
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                acquired = permits.acquire_owned() => acquired.ok(),
            };

            let report = match permit {
                Some(permit) => {
                    let report = executor
                        .drive(&task_run_id, &graph, params, &cancel, events.as_ref())
                        .await;
                    drop(permit);
                    report
                }
                None => canceled_before_start(&task_run_id, &graph, params, events.as_ref()),
            };

            report
        });

        RunHandle {
            run_id,
            workflow_id,
            task,
        }
    }
}

fn canceled_before_start(run_id: &str, graph: &WorkflowGraph, params: Params, events: Option<&UnboundedSender<RunEvent>>) -> RunReport {
    info!(run_id = %run_id, workflow_id = %graph.workflow_id(), "run canceled before it started");
    if let Some(events) = events {
        let _ = events.send(RunEvent::RunFinished {
            status: RunStatus::Canceled,
            finished_at: Utc::now(),
            failure: None,
        });
    }
    RunReport {
        run_id: run_id.to_string(),
        workflow_id: graph.workflow_id().to_string(),
        status: RunStatus::Canceled,
        params,
        failure: None,
        visited: Vec::new(),
        poll_attempts: 0,
    }
}

fn lock(runs: &ActiveRuns) -> MutexGuard<'_, HashMap<String, ActiveRun>> {
    runs.lock().unwrap_or_else(PoisonError::into_inner)
}
