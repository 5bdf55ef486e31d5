//! Conversation routing.
//!
//! The [`Router`] reads the merged inbound stream and hands each message to
//! the [`Worker`] owning its conversation. Each worker is a task with its
//! own queue, so turns within one conversation run strictly in arrival
//! order while different conversations proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;

use crate::agent::agent_loop::{AgentLoop, LoopBudget, TurnOutcome};
use crate::agent::session::Session;
use crate::agent::submission::{Submission, SubmissionResult};
use crate::channels::{ChannelManager, IncomingMessage, MessageStream, OutgoingMessage};
use crate::context::CallerId;

const WORKER_QUEUE: usize = 32;

/// Settings shared by every conversation worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub history_window: usize,
    pub budget: LoopBudget,
}

/// Conversations with no channel behind them: job and heartbeat owners.
/// Reports addressed there are logged, not answered.
pub fn is_internal_conversation(conversation_id: &str) -> bool {
    matches!(
        conversation_id.split_once(':').map(|(prefix, _)| prefix),
        Some("cron") | Some("heartbeat")
    )
}

/// One conversation: its history plus the loop that answers it.
pub struct Worker {
    session: Session,
    agent: Arc<AgentLoop>,
    budget: LoopBudget,
}

impl Worker {
    pub fn new(conversation_id: impl Into<String>, agent: Arc<AgentLoop>, config: WorkerConfig) -> Self {
        Self {
            session: Session::new(conversation_id, config.history_window),
            agent,
            budget: config.budget,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Process one submission to completion.
    pub async fn handle(&mut self, submission: Submission) -> SubmissionResult {
        let Some(input) = submission.turn_input() else {
            self.session.clear();
            return SubmissionResult::ok_with_message("New session started.");
        };

        let caller = CallerId::Conversation(self.session.key().to_string());
        let turn = self
            .agent
            .run_turn(caller, self.session.history(), &input, self.budget)
            .await;
        self.session.extend(turn.messages);

        let text = turn.outcome.display_text();
        match turn.outcome {
            TurnOutcome::Failed(_) => SubmissionResult::error(text),
            _ => SubmissionResult::response(text),
        }
    }

    /// Drain `rx`, replying through `channels`, until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<IncomingMessage>, channels: Arc<ChannelManager>) {
        while let Some(msg) = rx.recv().await {
            let conversation = self.session.key().to_string();
            let submission = Submission::from_message(&msg);
            tracing::debug!(conversation = %conversation, "Handling message");

            let result = self.handle(submission).await;
            let Some(text) = result.reply_text() else {
                continue;
            };
            let Some(reply) = OutgoingMessage::to_conversation(&conversation, text) else {
                tracing::warn!(conversation = %conversation, "Cannot address reply");
                continue;
            };
            if let Err(e) = channels.send(reply).await {
                tracing::error!(conversation = %conversation, "Failed to send reply: {}", e);
            }
        }
        tracing::debug!(conversation = %self.session.key(), "Worker stopped");
    }
}

/// Routes inbound messages to per-conversation workers.
pub struct Router {
    agent: Arc<AgentLoop>,
    channels: Arc<ChannelManager>,
    config: WorkerConfig,
    workers: HashMap<String, mpsc::Sender<IncomingMessage>>,
}

impl Router {
    pub fn new(agent: Arc<AgentLoop>, channels: Arc<ChannelManager>, config: WorkerConfig) -> Self {
        Self {
            agent,
            channels,
            config,
            workers: HashMap::new(),
        }
    }

    /// Conversations with a live worker.
    pub fn active_conversations(&self) -> usize {
        self.workers.len()
    }

    pub async fn route(&mut self, msg: IncomingMessage) {
        let conversation = msg.conversation_id();

        if is_internal_conversation(&conversation) {
            tracing::info!(
                conversation = %conversation,
                sender = %msg.sender_id,
                "Report for internal owner: {}",
                msg.content
            );
            return;
        }

        let sender = self
            .workers
            .entry(conversation.clone())
            .or_insert_with(|| spawn_worker(&conversation, &self.agent, &self.channels, self.config));

        let msg = match sender.send(msg).await {
            Ok(()) => return,
            Err(mpsc::error::SendError(msg)) => msg,
        };

        tracing::warn!(conversation = %conversation, "Worker gone, restarting");
        let sender = spawn_worker(&conversation, &self.agent, &self.channels, self.config);
        if sender.send(msg).await.is_err() {
            tracing::error!(conversation = %conversation, "Dropped message: worker unavailable");
        }
        self.workers.insert(conversation, sender);
    }

    /// Route until the inbound stream ends.
    pub async fn run(mut self, mut inbound: MessageStream) {
        while let Some(msg) = inbound.next().await {
            self.route(msg).await;
        }
        tracing::info!("Inbound stream closed, router stopping");
    }
}

fn spawn_worker(
    conversation: &str,
    agent: &Arc<AgentLoop>,
    channels: &Arc<ChannelManager>,
    config: WorkerConfig,
) -> mpsc::Sender<IncomingMessage> {
    let (tx, rx) = mpsc::channel(WORKER_QUEUE);
    let worker = Worker::new(conversation, agent.clone(), config);
    tokio::spawn(worker.run(rx, channels.clone()));
    tracing::debug!(conversation = %conversation, "Started conversation worker");
    tx
}
