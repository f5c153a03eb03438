//! Error types for action dispatch and run scheduling.

use confluo_types::FailureCategory;
use thiserror::Error;

/// Errors returned by action invocations and by the dispatcher itself.
///
/// [`ActionError::NotTriggered`] is not a failure: trigger actions return it while the awaited
/// external condition has not occurred, and the poller keeps polling. Every other variant ends
/// the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("provider not found: {provider}")]
    ProviderNotFound { provider: String },

    #[error("action not found: {action} in provider {provider}")]
    ActionNotFound { provider: String, action: String },

    #[error("action not triggered")]
    NotTriggered,

    #[error("configuration error: {key} - {message}")]
    Configuration { key: String, message: String },

    #[error("transient external error: {message}")]
    TransientExternal { message: String },

    #[error("permanent external error{}: {message}", status_suffix(.status))]
    PermanentExternal { status: Option<u16>, message: String },
}

impl ActionError {
    /// Create a provider not found error.
    pub fn provider_not_found(provider: impl Into<String>) -> Self {
        Self::ProviderNotFound { provider: provider.into() }
    }

    /// Create an action not found error.
    pub fn action_not_found(provider: impl Into<String>, action: impl Into<String>) -> Self {
        Self::ActionNotFound {
            provider: provider.into(),
            action: action.into(),
        }
    }

    /// Create a configuration error for a missing or mistyped parameter.
    pub fn configuration(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a transient external error (network fault, 5xx).
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientExternal { message: message.into() }
    }

    /// Create a permanent external error (rejected request).
    pub fn permanent(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::PermanentExternal {
            status,
            message: message.into(),
        }
    }

    pub fn is_not_triggered(&self) -> bool {
        matches!(self, Self::NotTriggered)
    }

    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::ProviderNotFound { .. } | Self::ActionNotFound { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientExternal { .. })
    }

    pub fn category(&self) -> FailureCategory {
        match self {
            Self::ProviderNotFound { .. } | Self::ActionNotFound { .. } => FailureCategory::Lookup,
            Self::NotTriggered => FailureCategory::NotTriggered,
            Self::Configuration { .. } => FailureCategory::Configuration,
            Self::TransientExternal { .. } => FailureCategory::TransientExternal,
            Self::PermanentExternal { .. } => FailureCategory::PermanentExternal,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" ({code})")).unwrap_or_default()
}

/// Result type returned by every action.
pub type ActionResult = Result<confluo_types::Params, ActionError>;

/// Errors surfaced when awaiting a scheduled run.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("run '{run_id}' task ended abnormally: {reason}")]
    RunAborted { run_id: String, reason: String },
}
