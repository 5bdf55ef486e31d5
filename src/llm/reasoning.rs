//! Adapter from the raw provider reply to the loop's next action.

use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{
    ChatMessage, LlmProvider, ToolCompletionRequest, ToolDefinition, UsageTracker,
};
use crate::tools::ToolCall;

/// Context for one decision.
#[derive(Debug, Clone, Default)]
pub struct ReasoningContext {
    /// System prompt placed ahead of the history.
    pub system_prompt: Option<String>,
    /// Conversation history, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Available tools.
    pub available_tools: Vec<ToolDefinition>,
}

impl ReasoningContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Add a message to the context.
    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Set available tools.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.available_tools = tools;
        self
    }
}

/// What the decision-maker wants to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum NextAction {
    /// Run these tools in order, then ask again.
    Tools {
        /// Any text the model produced alongside the calls.
        content: String,
        calls: Vec<ToolCall>,
    },
    /// Final answer for this turn.
    Answer(String),
}

/// Reasoning engine for the agent.
pub struct Reasoning {
    llm: Arc<dyn LlmProvider>,
    usage: Option<UsageTracker>,
}

impl Reasoning {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm, usage: None }
    }

    /// Record token usage of every call.
    pub fn with_usage_tracker(mut self, tracker: UsageTracker) -> Self {
        self.usage = Some(tracker);
        self
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Ask the decision-maker for the next action.
    pub async fn next_action(&self, context: &ReasoningContext) -> Result<NextAction, LlmError> {
        let mut messages = Vec::with_capacity(context.messages.len() + 1);
        if let Some(ref prompt) = context.system_prompt {
            messages.push(ChatMessage::system(prompt.clone()));
        }
        messages.extend(context.messages.iter().cloned());

        let mut request = ToolCompletionRequest::new(messages, context.available_tools.clone())
            .with_max_tokens(4096)
            .with_temperature(0.7);
        if !context.available_tools.is_empty() {
            request = request.with_tool_choice("auto");
        }

        let response = self.llm.complete_with_tools(request).await?;

        if let (Some(tracker), Some(usage)) = (&self.usage, &response.usage) {
            tracker.record(self.llm.model_name(), usage).await;
        }

        let content = response.content.unwrap_or_default();
        if response.tool_calls.is_empty() {
            return Ok(NextAction::Answer(content));
        }

        let calls = response
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, mut call)| {
                if call.id.is_empty() {
                    call.id = format!("call_{}", i);
                }
                call
            })
            .collect();

        Ok(NextAction::Tools { content, calls })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{TokenUsage, ToolCompletionResponse};
    use async_trait::async_trait;

    struct FixedProvider(ToolCompletionResponse);

    #[async_trait]
    impl LlmProvider for FixedProvider {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn complete_with_tools(
            &self,
            _request: ToolCompletionRequest,
        ) -> Result<ToolCompletionResponse, LlmError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_reasoning_context_builder() {
        let context = ReasoningContext::new()
            .with_system_prompt("be brief")
            .with_message(ChatMessage::user("Hello"));

        assert_eq!(context.messages.len(), 1);
        assert!(context.system_prompt.is_some());
    }

    #[tokio::test]
    async fn test_text_only_reply_is_answer() {
        let reasoning = Reasoning::new(Arc::new(FixedProvider(ToolCompletionResponse {
            content: Some("done".to_string()),
            ..Default::default()
        })));
        let action = reasoning.next_action(&ReasoningContext::new()).await.unwrap();
        assert_eq!(action, NextAction::Answer("done".to_string()));
    }

    #[tokio::test]
    async fn test_tool_calls_get_ids_and_usage_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = dir.path().join("usage.jsonl");
        let reasoning = Reasoning::new(Arc::new(FixedProvider(ToolCompletionResponse {
            content: None,
            tool_calls: vec![ToolCall::new("", "exec", serde_json::json!({"command": "ls"}))],
            usage: Some(TokenUsage {
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5,
            }),
        })))
        .with_usage_tracker(UsageTracker::new(&ledger));

        match reasoning.next_action(&ReasoningContext::new()).await.unwrap() {
            NextAction::Tools { calls, .. } => assert_eq!(calls[0].id, "call_0"),
            other => panic!("expected tool calls, got {other:?}"),
        }
        assert_eq!(std::fs::read_to_string(ledger).unwrap().lines().count(), 1);
    }
}
