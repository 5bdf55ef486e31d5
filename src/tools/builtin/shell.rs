//! Shell execution tool.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::sandbox::CommandExecutor;
use crate::tools::tool::{SideEffect, Tool, ToolError, ToolOutput, require_str};

/// Runs a shell command through the sandboxed executor.
pub struct ExecTool {
    executor: Arc<CommandExecutor>,
}

impl ExecTool {
    pub fn new(executor: Arc<CommandExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its combined output. Destructive commands \
         are refused, and output is cut at a fixed size. Use with caution."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute",
                    "minLength": 1
                },
                "working_dir": {
                    "type": "string",
                    "description": "Optional working directory for the command"
                }
            },
            "required": ["command"]
        })
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::ProcessSpawning
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolOutput, ToolError> {
        let command = require_str(&params, "command")?;

        let ctx = match params.get("working_dir").and_then(|v| v.as_str()) {
            Some(dir) => ctx.clone().with_working_dir(ctx.resolve_path(dir)),
            None => ctx.clone(),
        };

        let out = self.executor.execute(command, &ctx).await?;
        Ok(ToolOutput::text(out.output, out.duration).with_truncated(out.truncated))
    }
}
