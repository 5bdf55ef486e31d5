//! Tool for managing scheduled jobs from inside a conversation.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::context::{CallerId, ExecutionContext};
use crate::scheduler::{JobDefinition, JobPayload, Scheduler, Trigger, parse_timestamp};
use crate::tools::tool::{SideEffect, Tool, ToolError, ToolOutput, optional_u64, require_str};

/// Adds, lists and removes jobs. Jobs added from a conversation report
/// back to it.
pub struct CronTool {
    scheduler: Arc<Scheduler>,
}

impl CronTool {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }

    async fn add(
        &self,
        params: &serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<String, ToolError> {
        let message = require_str(params, "message")?;
        let every = optional_u64(params, "every_seconds");
        let cron_expr = params.get("cron_expr").and_then(|v| v.as_str());
        let at = params.get("at").and_then(|v| v.as_str());
        let tz = params
            .get("tz")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let trigger = match (every, cron_expr, at) {
            (Some(secs), None, None) => Trigger::every(secs),
            (None, Some(expr), None) => Trigger::cron(expr, tz),
            (None, None, Some(at)) => Trigger::at(parse_timestamp(at)?),
            _ => {
                return Err(ToolError::InvalidParameters(
                    "exactly one of every_seconds, cron_expr or at is required".to_string(),
                ));
            }
        };
        let one_shot = !trigger.is_recurring();

        let mut payload = JobPayload::message(message);
        if let CallerId::Conversation(ref conversation) = ctx.caller
            && let Some((channel, chat_id)) = conversation.split_once(':')
        {
            payload = payload.deliver_to(channel, chat_id);
        }

        let name: String = message.chars().take(30).collect();
        let job = JobDefinition::new(name, trigger, payload).with_delete_after_run(one_shot);
        let job = self.scheduler.add_job(job).await?;

        Ok(format!(
            "Created job '{}' (id: {}), {}",
            job.name,
            job.id,
            job.trigger.describe()
        ))
    }

    async fn list(&self) -> Result<String, ToolError> {
        let jobs = self.scheduler.list_jobs(false).await?;
        if jobs.is_empty() {
            return Ok("No scheduled jobs.".to_string());
        }
        let lines: Vec<String> = jobs
            .iter()
            .map(|j| format!("- {} (id: {}, {})", j.name, j.id, j.trigger.describe()))
            .collect();
        Ok(format!("Scheduled jobs:\n{}", lines.join("\n")))
    }
}

#[async_trait]
impl Tool for CronTool {
    fn name(&self) -> &str {
        "cron"
    }

    fn description(&self) -> &str {
        "Schedule reminders and recurring tasks. Actions: add, list, remove. For add, \
         give exactly one of every_seconds, cron_expr (optionally with tz) or at."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["add", "list", "remove"],
                    "description": "Action to perform"
                },
                "message": {
                    "type": "string",
                    "description": "Instruction to run when the job fires (for add)"
                },
                "every_seconds": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Interval in seconds (recurring)"
                },
                "cron_expr": {
                    "type": "string",
                    "description": "Cron expression like '0 9 * * *' (recurring)"
                },
                "tz": {
                    "type": "string",
                    "description": "IANA timezone for cron_expr, e.g. 'America/New_York'"
                },
                "at": {
                    "type": "string",
                    "description": "ISO timestamp for a one-time job"
                },
                "job_id": {
                    "type": "string",
                    "description": "Job id (for remove)"
                }
            },
            "required": ["action"]
        })
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Mutating
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let action = require_str(&params, "action")?;

        let text = match action {
            "add" => self.add(&params, ctx).await?,
            "list" => self.list().await?,
            "remove" => {
                let id = require_str(&params, "job_id")?;
                self.scheduler.remove_job(id).await?;
                format!("Removed job {}", id)
            }
            other => {
                return Err(ToolError::InvalidParameters(format!(
                    "unknown action '{}'",
                    other
                )));
            }
        };

        Ok(ToolOutput::text(text, start.elapsed()))
    }
}
