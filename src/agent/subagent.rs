//! Background subagents.
//!
//! A subagent is an independent [`AgentLoop`] turn seeded with a single
//! task. The supervisor tracks every handle it gives out, enforces a cap on
//! concurrently running subagents per owner, and delivers each result to
//! the owner's inbound queue exactly once (or hands it to [`collect`] if
//! the owner polls first). A handle is released as soon as its result has
//! left the supervisor; after that its id is unknown.
//!
//! [`collect`]: SubagentSupervisor::collect

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::agent::agent_loop::{AgentLoop, LoopBudget};
use crate::channels::IncomingMessage;
use crate::context::CallerId;
use crate::error::ErrorKind;
use crate::scheduler::{JobDefinition, JobRunOutcome, JobRunner};
use crate::tools::{ToolError, ToolResult};

/// Sender id on delivered reports.
pub const SUBAGENT_SENDER: &str = "subagent";

/// Returned by [`SubagentSupervisor::spawn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubagentHandle {
    pub id: Uuid,
    pub label: String,
}

/// Lifecycle of a subagent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubagentStatus {
    Running,
    Completed,
    Failed,
}

/// What [`SubagentSupervisor::collect`] found.
#[derive(Debug, Clone, PartialEq)]
pub enum Collected {
    /// Still working.
    Running,
    /// Finished, and this call took the result. The handle is released.
    Finished(ToolResult),
}

struct Entry {
    label: String,
    task: String,
    owner: String,
    status: SubagentStatus,
    /// Set once terminal. The entry is removed when it is taken.
    result: Option<ToolResult>,
}

#[derive(Default)]
struct State {
    entries: HashMap<Uuid, Entry>,
    running_per_owner: HashMap<String, usize>,
}

struct Inner {
    agent: OnceLock<Weak<AgentLoop>>,
    inbound: mpsc::Sender<IncomingMessage>,
    max_per_owner: usize,
    budget: LoopBudget,
    state: Mutex<State>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves the maps consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a terminal result and release the owner's slot.
    fn finish(&self, id: Uuid, result: ToolResult) {
        let mut state = self.state();
        let Some(entry) = state.entries.get_mut(&id) else {
            return;
        };
        entry.status = if result.is_success() {
            SubagentStatus::Completed
        } else {
            SubagentStatus::Failed
        };
        entry.result = Some(result);
        let owner = entry.owner.clone();

        if let Some(running) = state.running_per_owner.get_mut(&owner) {
            *running = running.saturating_sub(1);
            if *running == 0 {
                state.running_per_owner.remove(&owner);
            }
        }
    }

    /// Push the result into the owner's inbound queue unless it was
    /// already collected, releasing the handle.
    async fn deliver(&self, id: Uuid) {
        let (message, entry) = {
            let mut state = self.state();
            if state.entries.get(&id).is_none_or(|e| e.result.is_none()) {
                return;
            }
            let Some(entry) = state.entries.remove(&id) else {
                return;
            };
            (report_message(id, &entry), entry)
        };

        let owner = message.chat_id.clone();
        if let Err(e) = self.inbound.send(message).await {
            tracing::error!(subagent_id = %id, owner = %owner, "Failed to deliver subagent result: {}", e);
            // Leave it for collect().
            self.state().entries.insert(id, entry);
        } else {
            tracing::debug!(subagent_id = %id, owner = %owner, "Subagent result delivered");
        }
    }
}

fn report_message(id: Uuid, entry: &Entry) -> IncomingMessage {
    let (status, body, kind) = match &entry.result {
        Some(ToolResult::Success { output }) => ("completed successfully", output.clone(), None),
        Some(result) => ("failed", result.to_message(), result.kind()),
        None => ("failed", "no result".to_string(), Some(ErrorKind::InternalError)),
    };
    let content = format!(
        "[Subagent '{}' {}]\n\nTask: {}\n\nResult:\n{}",
        entry.label, status, entry.task, body
    );
    let metadata = json!({
        "subagent_id": id.to_string(),
        "label": entry.label,
        "kind": kind.map(|k| k.as_str()),
    });
    IncomingMessage::system(SUBAGENT_SENDER, entry.owner.clone(), content).with_metadata(metadata)
}

fn default_label(task: &str) -> String {
    let head: String = task.chars().take(30).collect();
    if head.len() < task.len() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Spawns and tracks subagents.
#[derive(Clone)]
pub struct SubagentSupervisor {
    inner: Arc<Inner>,
}

impl SubagentSupervisor {
    /// `inbound` is the queue owners read from; `max_per_owner` caps
    /// concurrently running subagents per owner.
    pub fn new(inbound: mpsc::Sender<IncomingMessage>, max_per_owner: usize, budget: LoopBudget) -> Self {
        Self {
            inner: Arc::new(Inner {
                agent: OnceLock::new(),
                inbound,
                max_per_owner,
                budget,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Bind the loop subagents run on. The loop's own registry usually
    /// holds this supervisor, hence the weak reference.
    pub fn attach(&self, agent: &Arc<AgentLoop>) {
        if self.inner.agent.set(Arc::downgrade(agent)).is_err() {
            tracing::warn!("Subagent supervisor already attached, ignoring");
        }
    }

    /// Subagents currently running for `owner`.
    pub fn running_for(&self, owner: &str) -> usize {
        self.inner
            .state()
            .running_per_owner
            .get(owner)
            .copied()
            .unwrap_or(0)
    }

    /// `None` once the handle has been released.
    pub fn status(&self, id: Uuid) -> Option<SubagentStatus> {
        self.inner.state().entries.get(&id).map(|e| e.status)
    }

    /// Start a subagent on `task` for `owner`. Returns immediately.
    pub fn spawn(&self, task: &str, label: Option<&str>, owner: &str) -> Result<SubagentHandle, ToolError> {
        let agent = self
            .inner
            .agent
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| ToolError::Internal("subagent supervisor has no agent loop".to_string()))?;

        let id = Uuid::new_v4();
        let label = label
            .map(str::to_string)
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| default_label(task));

        {
            let mut state = self.inner.state();
            let running = state.running_per_owner.entry(owner.to_string()).or_default();
            if *running >= self.inner.max_per_owner {
                tracing::warn!(owner = %owner, limit = self.inner.max_per_owner, "Subagent limit reached");
                return Err(ToolError::ResourceExhausted(format!(
                    "{} subagents already running for {} (limit {})",
                    running, owner, self.inner.max_per_owner
                )));
            }
            *running += 1;
            state.entries.insert(
                id,
                Entry {
                    label: label.clone(),
                    task: task.to_string(),
                    owner: owner.to_string(),
                    status: SubagentStatus::Running,
                    result: None,
                },
            );
        }

        tracing::info!(subagent_id = %id, owner = %owner, label = %label, "Spawned subagent");

        let inner = self.inner.clone();
        let task = task.to_string();
        let caller = CallerId::Subagent {
            id,
            owner: owner.to_string(),
        };
        let budget = self.inner.budget;
        tokio::spawn(async move {
            // Inner task so a panic in the loop surfaces as a JoinError here.
            let run = tokio::spawn(async move { agent.run_turn(caller, &[], &task, budget).await });
            let result = match run.await {
                Ok(turn) => turn.outcome.into_tool_result(),
                Err(e) => {
                    tracing::error!(subagent_id = %id, "Subagent crashed: {}", e);
                    ToolResult::failure(ErrorKind::InternalError, format!("subagent crashed: {}", e))
                }
            };
            inner.finish(id, result);
            inner.deliver(id).await;
        });

        Ok(SubagentHandle { id, label })
    }

    /// Non-blocking poll. Takes the result if it has not been delivered
    /// yet; `None` for unknown or released handles.
    pub fn collect(&self, id: Uuid) -> Option<Collected> {
        let mut state = self.inner.state();
        if state.entries.get(&id)?.result.is_none() {
            return Some(Collected::Running);
        }
        let result = state.entries.remove(&id)?.result?;
        Some(Collected::Finished(result))
    }

    /// Handles not yet released.
    pub fn tracked(&self) -> usize {
        self.inner.state().entries.len()
    }
}

#[async_trait]
impl JobRunner for SubagentSupervisor {
    async fn run_job(&self, job: &JobDefinition) -> Result<JobRunOutcome, ToolError> {
        let owner = job
            .payload
            .delivery_target()
            .unwrap_or_else(|| CallerId::Job(job.id.clone()).reply_to());
        let handle = self.spawn(&job.payload.message, Some(&job.name), &owner)?;
        Ok(JobRunOutcome::Dispatched {
            run_id: handle.id.to_string(),
        })
    }
}
