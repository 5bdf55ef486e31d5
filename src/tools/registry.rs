//! Tool registry for managing available tools.
//!
//! The registry is filled once at boot and then frozen behind an `Arc`:
//! lookups take no lock, and changing the tool set means restarting.

use std::collections::HashMap;
use std::sync::Arc;

use crate::llm::ToolDefinition;
use crate::tools::tool::{SideEffect, Tool, ToolError};

/// Everything the dispatcher knows about one capability.
#[derive(Clone)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub side_effect: SideEffect,
    pub handler: Arc<dyn Tool>,
}

impl CapabilityDescriptor {
    fn from_tool(tool: Arc<dyn Tool>) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters_schema(),
            side_effect: tool.side_effect(),
            handler: tool,
        }
    }
}

impl std::fmt::Debug for CapabilityDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityDescriptor")
            .field("name", &self.name)
            .field("side_effect", &self.side_effect)
            .finish()
    }
}

/// Registry of available tools.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, CapabilityDescriptor>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names are unique; a second registration under the
    /// same name is rejected rather than replacing the first.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let descriptor = CapabilityDescriptor::from_tool(tool);
        if self.tools.contains_key(&descriptor.name) {
            return Err(ToolError::Conflict(format!(
                "tool '{}' is already registered",
                descriptor.name
            )));
        }
        tracing::debug!("Registered tool: {}", descriptor.name);
        self.tools.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.tools.get(name)
    }

    /// Check if a tool exists.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all tool names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of registered tools.
    pub fn count(&self) -> usize {
        self.tools.len()
    }

    /// Get tool definitions for LLM function calling, sorted by name.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Get tool definitions, leaving out the named tools.
    pub fn tool_definitions_except(&self, excluded: &[&str]) -> Vec<ToolDefinition> {
        self.tool_definitions()
            .into_iter()
            .filter(|d| !excluded.contains(&d.name.as_str()))
            .collect()
    }

    /// Freeze the registry for shared read-only use.
    pub fn freeze(self) -> Arc<Self> {
        tracing::info!("Registered {} tools", self.count());
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::tools::tool::ToolOutput;
    use async_trait::async_trait;
    use std::time::Duration;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the message back"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            })
        }

        async fn execute(
            &self,
            params: serde_json::Value,
            _ctx: &ExecutionContext,
        ) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text(
                params["message"].as_str().unwrap_or_default(),
                Duration::ZERO,
            ))
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();

        assert!(registry.has("echo"));
        assert_eq!(registry.get("echo").unwrap().side_effect, SideEffect::ReadOnly);
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        let err = registry.register(Arc::new(EchoTool)).unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_tool_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();

        let defs = registry.tool_definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        assert!(registry.tool_definitions_except(&["echo"]).is_empty());
    }
}
