//! Tool trait and the result envelope shared by every capability.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::error::ErrorKind;

/// What a tool may do to the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    ReadOnly,
    Mutating,
    Network,
    ProcessSpawning,
}

/// Errors raised by tool handlers and the execution layer.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("{0}")]
    PolicyViolation(String),

    #[error("command exceeded {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{output}\nExit code: {exit_code}")]
    NonZeroExit { exit_code: i32, output: String },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Map to the shared failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::InvalidParameters(_) => ErrorKind::InvalidArguments,
            ToolError::PolicyViolation(_) => ErrorKind::PolicyViolation,
            ToolError::Timeout(_) => ErrorKind::Timeout,
            ToolError::NonZeroExit { .. } => ErrorKind::NonZeroExit,
            ToolError::ExecutionFailed(_) | ToolError::ExternalService(_) => {
                ErrorKind::ExecutionError
            }
            ToolError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            ToolError::BudgetExceeded(_) => ErrorKind::BudgetExceeded,
            ToolError::Conflict(_) => ErrorKind::Conflict,
            ToolError::Store(_) => ErrorKind::StoreError,
            ToolError::Internal(_) => ErrorKind::InternalError,
        }
    }
}

impl From<crate::error::SchedulerError> for ToolError {
    fn from(err: crate::error::SchedulerError) -> Self {
        use crate::error::SchedulerError;
        match err {
            SchedulerError::Conflict { .. } => ToolError::Conflict(err.to_string()),
            SchedulerError::NotFound { .. } | SchedulerError::InvalidTrigger(_) => {
                ToolError::InvalidParameters(err.to_string())
            }
            SchedulerError::Store(_) => ToolError::Store(err.to_string()),
        }
    }
}

/// Output of a successful handler invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Text handed back to the decision-maker.
    pub content: String,
    /// Time spent in the handler.
    pub duration: Duration,
    /// Set when the handler already cut the content and marked it.
    pub truncated: bool,
}

impl ToolOutput {
    /// Plain-text output.
    pub fn text(content: impl Into<String>, duration: Duration) -> Self {
        Self {
            content: content.into(),
            duration,
            truncated: false,
        }
    }

    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    /// Structured output, rendered as pretty JSON.
    pub fn success(result: serde_json::Value, duration: Duration) -> Self {
        let content = serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string());
        Self {
            content,
            duration,
            truncated: false,
        }
    }
}

/// A tool invocation requested by the decision-maker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back with the result.
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Terminal result of one tool call. Every call produces exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success { output: String },
    Failure { kind: ErrorKind, message: String },
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        ToolResult::Success {
            output: output.into(),
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        ToolResult::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    /// Failure kind, `None` on success.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ToolResult::Success { .. } => None,
            ToolResult::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Render for the decision-maker or an end user.
    pub fn to_message(&self) -> String {
        match self {
            ToolResult::Success { output } => output.clone(),
            ToolResult::Failure { kind, message } => format!("Error ({}): {}", kind, message),
        }
    }
}

impl From<ToolError> for ToolResult {
    fn from(err: ToolError) -> Self {
        ToolResult::failure(err.kind(), err.to_string())
    }
}

/// A capability the decision-maker can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name, used as the registry key.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema (object) describing the accepted arguments.
    fn parameters_schema(&self) -> serde_json::Value;

    fn side_effect(&self) -> SideEffect {
        SideEffect::ReadOnly
    }

    /// Run the tool. Arguments have already been validated against
    /// [`Tool::parameters_schema`].
    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolOutput, ToolError>;
}

/// Fetch an optional non-negative integer argument.
///
/// Integral floats such as `60.0` pass schema validation as integers, so
/// they are accepted here too.
pub fn optional_u64(params: &serde_json::Value, name: &str) -> Option<u64> {
    let value = params.get(name)?;
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
            .map(|f| f as u64)
    })
}

/// Fetch a required string argument.
pub fn require_str<'a>(params: &'a serde_json::Value, name: &str) -> Result<&'a str, ToolError> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing '{}' parameter", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_u64_accepts_integral_floats() {
        let params = serde_json::json!({"a": 60, "b": 60.0, "c": 1.5, "d": -3, "e": "60"});
        assert_eq!(optional_u64(&params, "a"), Some(60));
        assert_eq!(optional_u64(&params, "b"), Some(60));
        assert_eq!(optional_u64(&params, "c"), None);
        assert_eq!(optional_u64(&params, "d"), None);
        assert_eq!(optional_u64(&params, "e"), None);
        assert_eq!(optional_u64(&params, "missing"), None);
    }

    #[test]
    fn test_non_zero_exit_message_keeps_output() {
        let err = ToolError::NonZeroExit {
            exit_code: 2,
            output: "ls: cannot access 'x'".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::NonZeroExit);
        assert_eq!(err.to_string(), "ls: cannot access 'x'\nExit code: 2");
    }

    #[test]
    fn test_timeout_message() {
        let err = ToolError::Timeout(Duration::from_secs(60));
        assert_eq!(err.to_string(), "command exceeded 60s");
    }

    #[test]
    fn test_tool_result_serde_shape() {
        let result = ToolResult::failure(ErrorKind::UnknownTool, "Tool 'x' not found");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["kind"], "unknown_tool");
        assert_eq!(result.to_message(), "Error (unknown_tool): Tool 'x' not found");
    }

    #[test]
    fn test_scheduler_error_conversion() {
        let err: ToolError = crate::error::SchedulerError::Conflict {
            id: "a1".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
