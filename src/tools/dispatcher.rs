//! Tool dispatch: lookup, validation, invocation, normalization.
//!
//! Every call that enters [`ToolDispatcher::dispatch`] leaves as exactly one
//! [`ToolResult`]. Handler panics and hangs are contained here so a single
//! misbehaving tool cannot take down the loop that called it.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;

use crate::context::ExecutionContext;
use crate::error::ErrorKind;
use crate::sandbox::truncate_output;
use crate::tools::registry::ToolRegistry;
use crate::tools::schema;
use crate::tools::tool::{ToolCall, ToolResult};

/// Slack on top of the context timeout before the dispatcher gives up on a
/// handler that does not enforce its own deadline.
const HANDLER_GRACE: Duration = Duration::from_secs(5);

/// Resolves tool calls against the registry and runs them.
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Dispatch one call under its own context.
    pub async fn dispatch(&self, call: &ToolCall, ctx: ExecutionContext) -> ToolResult {
        let Some(descriptor) = self.registry.get(&call.name) else {
            tracing::debug!(tool = %call.name, caller = %ctx.caller, "Unknown tool requested");
            return ToolResult::failure(
                ErrorKind::UnknownTool,
                format!(
                    "Tool '{}' not found. Available tools: {}",
                    call.name,
                    self.registry.list().join(", ")
                ),
            );
        };

        let errors = schema::validate(&descriptor.parameters, &call.arguments);
        if !errors.is_empty() {
            return ToolResult::failure(
                ErrorKind::InvalidArguments,
                format!(
                    "Invalid parameters for tool '{}': {}",
                    call.name,
                    errors.join("; ")
                ),
            );
        }

        let start = Instant::now();
        let limit = ctx.max_output_bytes;
        let deadline = ctx.timeout + HANDLER_GRACE;
        let handler = Arc::clone(&descriptor.handler);
        let params = call.arguments.clone();

        tracing::debug!(tool = %call.name, caller = %ctx.caller, "Dispatching tool call");

        let invocation = AssertUnwindSafe(async move { handler.execute(params, &ctx).await })
            .catch_unwind();

        let result = match tokio::time::timeout(deadline, invocation).await {
            Ok(Ok(Ok(output))) if output.truncated => ToolResult::success(output.content),
            Ok(Ok(Ok(output))) => {
                let (content, truncated) = truncate_output(&output.content, limit);
                if truncated {
                    tracing::debug!(tool = %call.name, "Tool output truncated");
                }
                ToolResult::success(content)
            }
            Ok(Ok(Err(err))) => ToolResult::from(err),
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(tool = %call.name, "Tool handler panicked: {}", message);
                ToolResult::failure(
                    ErrorKind::InternalError,
                    format!("tool '{}' failed unexpectedly: {}", call.name, message),
                )
            }
            Err(_) => {
                tracing::warn!(tool = %call.name, "Tool handler exceeded its deadline");
                ToolResult::failure(
                    ErrorKind::Timeout,
                    format!("tool '{}' exceeded {}s", call.name, deadline.as_secs()),
                )
            }
        };

        tracing::debug!(
            tool = %call.name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            success = result.is_success(),
            "Tool call finished"
        );

        result
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
