//! Error types for nanoclaw.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Classified failure kind carried by every failed tool result.
///
/// Tool-level kinds (policy, timeout, exit status, arguments, unknown tool)
/// go back to the decision-maker as ordinary results. Internal, resource and
/// store kinds are logged and surfaced as degraded responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PolicyViolation,
    Timeout,
    NonZeroExit,
    ExecutionError,
    UnknownTool,
    InvalidArguments,
    InternalError,
    ResourceExhausted,
    BudgetExceeded,
    Conflict,
    StoreError,
}

impl ErrorKind {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PolicyViolation => "policy_violation",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NonZeroExit => "non_zero_exit",
            ErrorKind::ExecutionError => "execution_error",
            ErrorKind::UnknownTool => "unknown_tool",
            ErrorKind::InvalidArguments => "invalid_arguments",
            ErrorKind::InternalError => "internal_error",
            ErrorKind::ResourceExhausted => "resource_exhausted",
            ErrorKind::BudgetExceeded => "budget_exceeded",
            ErrorKind::Conflict => "conflict",
            ErrorKind::StoreError => "store_error",
        }
    }

    /// Whether the decision-maker is expected to recover by retrying with a
    /// different call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::PolicyViolation
                | ErrorKind::Timeout
                | ErrorKind::NonZeroExit
                | ErrorKind::ExecutionError
                | ErrorKind::UnknownTool
                | ErrorKind::InvalidArguments
                | ErrorKind::Conflict
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Channel adapter errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Channel {name} is not registered")]
    NotFound { name: String },

    #[error("Channel {name} health check failed")]
    HealthCheckFailed { name: String },
}

/// Decision-maker (LLM provider) errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned an invalid response: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Workspace document errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Document not found: {path}")]
    DocumentNotFound { path: PathBuf },

    #[error("I/O error on {path}: {reason}")]
    Io { path: PathBuf, reason: String },
}

/// Scheduler and job store errors.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Job {id} already exists")]
    Conflict { id: String },

    #[error("Job {id} not found")]
    NotFound { id: String },

    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    #[error("Job store error: {0}")]
    Store(String),
}

impl SchedulerError {
    /// Map to the shared failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::Conflict { .. } => ErrorKind::Conflict,
            SchedulerError::NotFound { .. } | SchedulerError::InvalidTrigger(_) => {
                ErrorKind::InvalidArguments
            }
            SchedulerError::Store(_) => ErrorKind::StoreError,
        }
    }
}
