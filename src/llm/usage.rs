//! Token usage ledger: one JSON line per decision-maker call.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::llm::TokenUsage;

/// One ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub ts: DateTime<Utc>,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Appends usage records to a JSONL file.
#[derive(Debug, Clone)]
pub struct UsageTracker {
    path: PathBuf,
}

impl UsageTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one call. Write failures are logged, never propagated: losing
    /// a ledger line must not fail the conversation.
    pub async fn record(&self, model: &str, usage: &TokenUsage) {
        if usage.total_tokens == 0 && usage.prompt_tokens == 0 && usage.completion_tokens == 0 {
            return;
        }

        let entry = UsageRecord {
            ts: Utc::now(),
            model: model.to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        };

        if let Err(e) = self.append(&entry).await {
            tracing::warn!(path = %self.path.display(), "Failed to write usage record: {}", e);
        }
    }

    async fn append(&self, entry: &UsageRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_appends_one_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = UsageTracker::new(dir.path().join("data/usage.jsonl"));
        let usage = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };

        tracker.record("test-model", &usage).await;
        tracker.record("test-model", &usage).await;
        tracker.record("test-model", &TokenUsage::default()).await;

        let text = std::fs::read_to_string(tracker.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let record: UsageRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(record.model, "test-model");
        assert_eq!(record.total_tokens, 15);
    }
}
