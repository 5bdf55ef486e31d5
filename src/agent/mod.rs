//! Core agent logic.
//!
//! The agent orchestrates:
//! - The decide/act loop shared by every caller
//! - Message routing from channels to per-conversation workers
//! - Background subagents and their result delivery
//! - Proactive heartbeat reviews

mod agent_loop;
mod heartbeat;
mod session;
mod subagent;
mod submission;
mod worker;

pub use agent_loop::{AgentLoop, LoopBudget, TurnOutcome, TurnResult};
pub use heartbeat::{HEARTBEAT_OK, HeartbeatConfig, HeartbeatResult, HeartbeatRunner, spawn_heartbeat};
pub use session::Session;
pub use subagent::{Collected, SUBAGENT_SENDER, SubagentHandle, SubagentStatus, SubagentSupervisor};
pub use submission::{Submission, SubmissionResult};
pub use worker::{Router, Worker, WorkerConfig, is_internal_conversation};
