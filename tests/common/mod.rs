//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use nanoclaw::context::ExecutionDefaults;
use nanoclaw::error::LlmError;
use nanoclaw::llm::{LlmProvider, ToolCompletionRequest, ToolCompletionResponse};
use nanoclaw::scheduler::{JobDefinition, JobRunOutcome, JobRunner, ManualClock};
use nanoclaw::tools::{ToolCall, ToolError};

/// Plays back a fixed list of replies, then answers "done".
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<ToolCompletionResponse>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply requesting one tool call.
    pub fn then_call(self, name: &str, arguments: serde_json::Value) -> Self {
        let id = format!("call_{}", self.replies.lock().unwrap().len());
        self.replies.lock().unwrap().push_back(ToolCompletionResponse {
            content: None,
            tool_calls: vec![ToolCall::new(id, name, arguments)],
            usage: None,
        });
        self
    }

    /// Queue a final answer.
    pub fn then_answer(self, text: &str) -> Self {
        self.replies.lock().unwrap().push_back(ToolCompletionResponse {
            content: Some(text.to_string()),
            ..Default::default()
        });
        self
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete_with_tools(
        &self,
        _request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let next = self.replies.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| ToolCompletionResponse {
            content: Some("done".to_string()),
            ..Default::default()
        }))
    }
}

/// Records every job it is handed.
#[derive(Default)]
pub struct RecordingRunner {
    pub runs: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}

#[async_trait]
impl JobRunner for RecordingRunner {
    async fn run_job(&self, job: &JobDefinition) -> Result<JobRunOutcome, ToolError> {
        self.runs.lock().unwrap().push(job.id.clone());
        Ok(JobRunOutcome::Dispatched {
            run_id: format!("run-{}", job.id),
        })
    }
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
    ))
}

pub fn defaults(root: &Path) -> ExecutionDefaults {
    ExecutionDefaults {
        working_dir: root.to_path_buf(),
        workspace_root: Some(root.to_path_buf()),
        timeout: Duration::from_secs(5),
        max_output_bytes: 10_000,
    }
}
