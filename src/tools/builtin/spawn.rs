//! Tool for delegating work to a background subagent.

use std::time::Instant;

use async_trait::async_trait;

use crate::agent::SubagentSupervisor;
use crate::context::ExecutionContext;
use crate::tools::tool::{SideEffect, Tool, ToolError, ToolOutput, require_str};

/// Starts a subagent and returns at once. The result arrives later as a
/// message in the caller's conversation.
pub struct SpawnTool {
    supervisor: SubagentSupervisor,
}

impl SpawnTool {
    pub fn new(supervisor: SubagentSupervisor) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl Tool for SpawnTool {
    fn name(&self) -> &str {
        "spawn"
    }

    fn description(&self) -> &str {
        "Spawn a subagent to handle a task in the background. Use this for complex or \
         time-consuming work that can run independently. The subagent reports back \
         when it is done."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The task for the subagent to complete",
                    "minLength": 1
                },
                "label": {
                    "type": "string",
                    "description": "Optional short label for the task (for display)"
                }
            },
            "required": ["task"]
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
        let start = Instant::now();
        let task = require_str(&params, "task")?;
        let label = params.get("label").and_then(|v| v.as_str());

        let handle = self
            .supervisor
            .spawn(task, label, &ctx.caller.reply_to())?;

        Ok(ToolOutput::text(
            format!(
                "Subagent '{}' started (id: {}). I'll be notified when it completes.",
                handle.label, handle.id
            ),
            start.elapsed(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::LoopBudget;
    use crate::context::CallerId;
    use crate::error::ErrorKind;
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawn_without_loop_is_internal_error() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let tool = SpawnTool::new(SubagentSupervisor::new(
            tx,
            1,
            LoopBudget::new(1, Duration::from_secs(1)),
        ));
        let ctx = ExecutionContext::new("/tmp", CallerId::Conversation("tg:1".to_string()));

        let err = tool
            .execute(serde_json::json!({"task": "research"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalError);
    }
}
