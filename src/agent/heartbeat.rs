//! Proactive heartbeat.
//!
//! On every tick the runner re-reads HEARTBEAT.md and hands its content,
//! verbatim, to a review turn. What the checklist means is up to the
//! decision-maker; the runner only knows the `HEARTBEAT_OK` sentinel for
//! "nothing to report".

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::agent::agent_loop::{AgentLoop, LoopBudget, TurnOutcome};
use crate::channels::{ChannelManager, OutgoingMessage};
use crate::context::CallerId;
use crate::workspace::Workspace;

/// Reply meaning the checklist needs no action.
pub const HEARTBEAT_OK: &str = "HEARTBEAT_OK";

/// Heartbeat settings.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// Conversation (`channel:chat_id`) that receives findings.
    pub notify: Option<String>,
    pub budget: LoopBudget,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30 * 60),
            notify: None,
            budget: LoopBudget::new(15, Duration::from_secs(300)),
        }
    }
}

/// Outcome of one heartbeat check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// No checklist, or an empty one.
    Skipped,
    /// Reviewed, nothing to report.
    Ok,
    /// Reviewed, the answer needs the user's attention.
    NeedsAttention(String),
    /// The review turn did not finish.
    Failed(String),
}

/// Runs heartbeat reviews.
pub struct HeartbeatRunner {
    config: HeartbeatConfig,
    workspace: Workspace,
    agent: Arc<AgentLoop>,
    channels: Arc<ChannelManager>,
}

impl HeartbeatRunner {
    pub fn new(
        config: HeartbeatConfig,
        workspace: Workspace,
        agent: Arc<AgentLoop>,
        channels: Arc<ChannelManager>,
    ) -> Self {
        Self {
            config,
            workspace,
            agent,
            channels,
        }
    }

    /// Review the current checklist once.
    pub async fn check_heartbeat(&self) -> HeartbeatResult {
        let checklist = match self.workspace.heartbeat_checklist().await {
            Ok(Some(content)) if !content.trim().is_empty() => content,
            Ok(_) => return HeartbeatResult::Skipped,
            Err(e) => {
                tracing::warn!("Failed to read heartbeat checklist: {}", e);
                return HeartbeatResult::Failed(e.to_string());
            }
        };

        let turn = self
            .agent
            .run_turn(
                CallerId::Heartbeat,
                &[],
                &review_prompt(&checklist),
                self.config.budget,
            )
            .await;

        match turn.outcome {
            TurnOutcome::Answer(answer) if answer.contains(HEARTBEAT_OK) => HeartbeatResult::Ok,
            TurnOutcome::Answer(answer) => HeartbeatResult::NeedsAttention(answer),
            other => HeartbeatResult::Failed(other.display_text()),
        }
    }

    /// Check once and forward anything worth reporting.
    pub async fn tick(&self) -> HeartbeatResult {
        let result = self.check_heartbeat().await;
        match &result {
            HeartbeatResult::Skipped => tracing::debug!("Heartbeat skipped: no checklist"),
            HeartbeatResult::Ok => tracing::debug!("Heartbeat: nothing to report"),
            HeartbeatResult::NeedsAttention(text) => self.notify(text).await,
            HeartbeatResult::Failed(reason) => {
                tracing::warn!("Heartbeat review failed: {}", reason);
            }
        }
        result
    }

    async fn notify(&self, text: &str) {
        let Some(target) = self.config.notify.as_deref() else {
            tracing::info!("Heartbeat finding (no notify target): {}", text);
            return;
        };
        let Some(msg) = OutgoingMessage::to_conversation(target, text) else {
            tracing::warn!(target = %target, "Heartbeat notify target is not channel:chat_id");
            return;
        };
        if let Err(e) = self.channels.send(msg).await {
            tracing::error!(target = %target, "Failed to send heartbeat finding: {}", e);
        }
    }
}

fn review_prompt(checklist: &str) -> String {
    format!(
        "Heartbeat review. Go through the checklist below and act on anything that is due. \
         If nothing needs attention, reply with exactly {}.\n\n## HEARTBEAT.md\n\n{}",
        HEARTBEAT_OK, checklist
    )
}

/// Start the heartbeat loop. Returns `None` when disabled.
pub fn spawn_heartbeat(runner: HeartbeatRunner) -> Option<JoinHandle<()>> {
    if !runner.config.enabled {
        tracing::info!("Heartbeat disabled");
        return None;
    }
    let interval = runner.config.interval;
    tracing::info!(interval_secs = interval.as_secs(), "Heartbeat started");

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            runner.tick().await;
        }
    }))
}
