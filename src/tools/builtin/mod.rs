//! Built-in tools that come with the agent.

mod cron;
mod filesystem;
mod http;
mod message;
mod shell;
mod spawn;

pub use cron::CronTool;
pub use filesystem::{EditFileTool, ListDirTool, ReadFileTool, WriteFileTool};
pub use http::HttpTool;
pub use message::MessageTool;
pub use shell::ExecTool;
pub use spawn::SpawnTool;
