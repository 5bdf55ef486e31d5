//! Messaging-channel interface.
//!
//! Concrete adapters (chat networks, push services) live outside this
//! crate. They implement [`Channel`]; the [`ChannelManager`] merges their
//! inbound streams and routes outbound messages by channel name.
//!
//! Internal producers (subagent reports, scheduled jobs) use the reserved
//! [`SYSTEM_CHANNEL`], whose `chat_id` is the target conversation id itself.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;

/// Channel name for messages produced inside the process.
pub const SYSTEM_CHANNEL: &str = "system";

/// Message received from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Channel the message arrived on.
    pub channel: String,
    /// Who sent it.
    pub sender_id: String,
    /// Chat within the channel.
    pub chat_id: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
    /// Adapter-specific extras.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl IncomingMessage {
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let chat_id = chat_id.into();
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            sender_id: chat_id.clone(),
            chat_id,
            content: content.into(),
            received_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Message from inside the process addressed to `conversation_id`.
    pub fn system(
        sender: impl Into<String>,
        conversation_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(SYSTEM_CHANNEL, conversation_id, content);
        msg.sender_id = sender.into();
        msg
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = sender_id.into();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_system(&self) -> bool {
        self.channel == SYSTEM_CHANNEL
    }

    /// Conversation this message belongs to, as `channel:chat_id`.
    pub fn conversation_id(&self) -> String {
        if self.is_system() {
            self.chat_id.clone()
        } else {
            format!("{}:{}", self.channel, self.chat_id)
        }
    }
}

/// Message to send on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub channel: String,
    pub chat_id: String,
    pub content: String,
}

impl OutgoingMessage {
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
        }
    }

    /// Address a reply to a `channel:chat_id` conversation id.
    ///
    /// Returns `None` for ids without a channel prefix.
    pub fn to_conversation(conversation_id: &str, content: impl Into<String>) -> Option<Self> {
        let (channel, chat_id) = conversation_id.split_once(':')?;
        Some(Self::new(channel, chat_id, content))
    }
}

/// Stream of inbound messages from one channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A messaging channel adapter.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send a message to a chat on this channel.
    async fn send(&self, msg: OutgoingMessage) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Routes outbound messages and merges inbound streams.
#[derive(Default)]
pub struct ChannelManager {
    channels: HashMap<String, Arc<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel. Done at boot, before the manager is shared.
    pub fn add(&mut self, channel: Arc<dyn Channel>) {
        tracing::debug!("Added channel: {}", channel.name());
        self.channels.insert(channel.name().to_string(), channel);
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Send a message on the channel it names.
    pub async fn send(&self, msg: OutgoingMessage) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get(&msg.channel)
            .ok_or_else(|| ChannelError::NotFound {
                name: msg.channel.clone(),
            })?;
        channel.send(msg).await
    }

    /// Start every channel and merge their streams. A channel that fails to
    /// start is logged and left out.
    pub async fn start_all(&self) -> MessageStream {
        let mut streams = Vec::new();
        for channel in self.channels.values() {
            match channel.start().await {
                Ok(stream) => {
                    tracing::info!("Started channel: {}", channel.name());
                    streams.push(stream);
                }
                Err(e) => tracing::error!("Failed to start channel {}: {}", channel.name(), e),
            }
        }
        Box::pin(futures::stream::select_all(streams))
    }

    pub async fn shutdown_all(&self) {
        for channel in self.channels.values() {
            if let Err(e) = channel.shutdown().await {
                tracing::warn!("Failed to shut down channel {}: {}", channel.name(), e);
            }
        }
    }
}
