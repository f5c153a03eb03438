//! Runtime status, lifecycle events, and the final report of one chain run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Params;

/// Where a run currently sits in its state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created but not yet started (e.g. waiting for a worker slot).
    #[default]
    Idle,
    /// Repeatedly calling the trigger action until it fires.
    Polling,
    /// Executing a chain node.
    Running,
    /// Reached the node without a successor and every call succeeded.
    Completed,
    /// A node returned an error other than the trigger's not-triggered signal.
    Failed,
    /// Stopped externally at a poll boundary or between nodes.
    Canceled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Canceled)
    }
}

/// Coarse classification of a run failure, mirroring the action error taxonomy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// A required parameter was missing or had the wrong type.
    Configuration,
    /// The provider or action name was not registered.
    Lookup,
    /// Network fault or server-side error from the external system.
    TransientExternal,
    /// Rejected by the external system.
    PermanentExternal,
    /// A chain node (not the trigger) reported that its condition has not occurred.
    NotTriggered,
}

/// Error surfaced by a failed run, together with the node that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunFailure {
    pub node_id: String,
    pub category: FailureCategory,
    pub message: String,
}

/// Lifecycle events emitted while a run progresses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        workflow_id: String,
        at: DateTime<Utc>,
    },
    PollAttempted {
        attempt: u64,
        triggered: bool,
    },
    Triggered {
        node_id: String,
        attempts: u64,
    },
    NodeStarted {
        node_id: String,
        provider: String,
        action: String,
        started_at: DateTime<Utc>,
    },
    NodeSucceeded {
        node_id: String,
        duration_ms: u64,
    },
    NodeFailed {
        node_id: String,
        failure: RunFailure,
    },
    RunFinished {
        status: RunStatus,
        finished_at: DateTime<Utc>,
        failure: Option<RunFailure>,
    },
}

/// User-visible outcome of one run.
///
/// `params` holds the final bag on completion and the last good bag (the one handed to the
/// failing node) on failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub workflow_id: String,
    pub status: RunStatus,
    pub params: Params,
    #[serde(default)]
    pub failure: Option<RunFailure>,
    /// Chain nodes executed after the trigger fired, trigger included, in order.
    #[serde(default)]
    pub visited: Vec<String>,
    pub poll_attempts: u64,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}
