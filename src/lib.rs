//! nanoclaw: a personal automation agent core.
//!
//! A decision-maker drives conversations by calling tools through a shared
//! [`tools::ToolDispatcher`]. Shell commands run through a policy-checked
//! [`sandbox::CommandExecutor`], long tasks go to background subagents
//! ([`agent::SubagentSupervisor`]), and deferred or recurring work is fired
//! by the [`scheduler::Scheduler`].

pub mod agent;
pub mod app;
pub mod channels;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod safety;
pub mod sandbox;
pub mod scheduler;
pub mod tools;
pub mod workspace;

pub use config::Config;
pub use error::ErrorKind;
