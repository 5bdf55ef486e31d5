//! Tool for sending a message to a chat.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::channels::{ChannelManager, OutgoingMessage};
use crate::context::ExecutionContext;
use crate::tools::tool::{SideEffect, Tool, ToolError, ToolOutput, require_str};

/// Sends a message through a channel, defaulting to the caller's conversation.
pub struct MessageTool {
    channels: Arc<ChannelManager>,
}

impl MessageTool {
    pub fn new(channels: Arc<ChannelManager>) -> Self {
        Self { channels }
    }
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a message to the user. Defaults to the current conversation; set channel \
         and chat_id to reach a different chat."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The message content to send",
                    "minLength": 1
                },
                "channel": {
                    "type": "string",
                    "description": "Optional target channel"
                },
                "chat_id": {
                    "type": "string",
                    "description": "Optional target chat within the channel"
                }
            },
            "required": ["content"]
        })
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Network
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let content = require_str(&params, "content")?;
        let channel = params.get("channel").and_then(|v| v.as_str());
        let chat_id = params.get("chat_id").and_then(|v| v.as_str());

        let msg = match (channel, chat_id) {
            (Some(channel), Some(chat_id)) => OutgoingMessage::new(channel, chat_id, content),
            (None, None) => OutgoingMessage::to_conversation(&ctx.caller.reply_to(), content)
                .ok_or_else(|| {
                    ToolError::InvalidParameters(
                        "no current conversation; channel and chat_id are required".to_string(),
                    )
                })?,
            _ => {
                return Err(ToolError::InvalidParameters(
                    "channel and chat_id must be given together".to_string(),
                ));
            }
        };

        let target = format!("{}:{}", msg.channel, msg.chat_id);
        self.channels
            .send(msg)
            .await
            .map_err(|e| ToolError::ExternalService(e.to_string()))?;

        Ok(ToolOutput::text(
            format!("Message sent to {}", target),
            start.elapsed(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallerId;
    use serde_json::json;

    #[tokio::test]
    async fn test_unknown_channel_is_external_error() {
        let tool = MessageTool::new(Arc::new(ChannelManager::new()));
        let ctx = ExecutionContext::new("/tmp", CallerId::Conversation("tg:1".to_string()));

        let err = tool
            .execute(json!({"content": "hi"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExternalService(_)));
    }

    #[tokio::test]
    async fn test_partial_target_rejected() {
        let tool = MessageTool::new(Arc::new(ChannelManager::new()));
        let ctx = ExecutionContext::new("/tmp", CallerId::Heartbeat);

        let err = tool
            .execute(json!({"content": "hi", "channel": "tg"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }
}
