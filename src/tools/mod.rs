//! Tool registry, parameter validation, and dispatch.

pub mod builtin;
mod dispatcher;
mod registry;
pub mod schema;
mod tool;

pub use dispatcher::ToolDispatcher;
pub use registry::{CapabilityDescriptor, ToolRegistry};
pub use tool::{SideEffect, Tool, ToolCall, ToolError, ToolOutput, ToolResult, optional_u64, require_str};
