//! Job definitions as stored by the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scheduler::trigger::Trigger;

/// Lifecycle of a job. `Due` is computed per tick and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Scheduled,
    Dispatched,
    Completed,
}

/// Outcome of the most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    Error,
    Skipped,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Ok => write!(f, "ok"),
            RunStatus::Error => write!(f, "error"),
            RunStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// What a job does when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Instruction handed to the agent.
    pub message: String,
    /// Report the result to `channel:to` instead of only logging it.
    #[serde(default)]
    pub deliver: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl JobPayload {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            deliver: false,
            channel: None,
            to: None,
        }
    }

    /// Deliver results to a chat.
    pub fn deliver_to(mut self, channel: impl Into<String>, to: impl Into<String>) -> Self {
        self.deliver = true;
        self.channel = Some(channel.into());
        self.to = Some(to.into());
        self
    }

    /// Conversation that should receive the result, if delivery is on.
    pub fn delivery_target(&self) -> Option<String> {
        match (self.deliver, &self.channel, &self.to) {
            (true, Some(channel), Some(to)) => Some(format!("{}:{}", channel, to)),
            _ => None,
        }
    }
}

/// A scheduled unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: String,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub trigger: Trigger,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_status: Option<RunStatus>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Remove a one-shot after it fires instead of keeping it as completed.
    #[serde(default)]
    pub delete_after_run: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl JobDefinition {
    /// Create a job with a fresh id. `next_run` is filled in when the
    /// scheduler accepts the job.
    pub fn new(name: impl Into<String>, trigger: Trigger, payload: JobPayload) -> Self {
        let now = Utc::now();
        Self {
            id: new_job_id(),
            name: name.into(),
            enabled: true,
            trigger,
            payload,
            status: JobStatus::Scheduled,
            next_run: None,
            last_run: None,
            last_status: None,
            last_error: None,
            delete_after_run: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_delete_after_run(mut self, delete: bool) -> Self {
        self.delete_after_run = delete;
        self
    }

    /// Whether the job should fire at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled
            && self.status == JobStatus::Scheduled
            && self.next_run.is_some_and(|t| t <= now)
    }
}

/// Short random job id.
pub fn new_job_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_requires_enabled_scheduled_and_past_next_run() {
        let now = Utc::now();
        let mut job = JobDefinition::new("t", Trigger::every(60), JobPayload::message("hi"));
        assert!(!job.is_due(now));

        job.next_run = Some(now);
        assert!(job.is_due(now));

        job.enabled = false;
        assert!(!job.is_due(now));

        job.enabled = true;
        job.status = JobStatus::Dispatched;
        assert!(!job.is_due(now));
    }

    #[test]
    fn test_delivery_target() {
        assert_eq!(JobPayload::message("x").delivery_target(), None);
        assert_eq!(
            JobPayload::message("x")
                .deliver_to("telegram", "42")
                .delivery_target(),
            Some("telegram:42".to_string())
        );
    }

    #[test]
    fn test_job_ids_are_short_and_unique() {
        let a = new_job_id();
        let b = new_job_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }
}
