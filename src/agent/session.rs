//! Per-conversation message history.

use chrono::{DateTime, Utc};

use crate::llm::{ChatMessage, Role};

/// In-memory history of one conversation, trimmed to a window.
#[derive(Debug, Clone)]
pub struct Session {
    key: String,
    messages: Vec<ChatMessage>,
    window: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// `window` is the number of most recent messages handed to the
    /// decision-maker.
    pub fn new(key: impl Into<String>, window: usize) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            messages: Vec::new(),
            window,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append the messages of a finished turn.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.messages.extend(messages);
        self.updated_at = Utc::now();

        // Keep at most twice the window in memory.
        let cap = self.window.saturating_mul(2).max(1);
        if self.messages.len() > cap {
            let excess = self.messages.len() - cap;
            self.messages.drain(..excess);
        }
    }

    /// The last `window` messages.
    ///
    /// A window never starts with tool results whose originating call was
    /// cut off.
    pub fn history(&self) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(self.window);
        let mut window = &self.messages[start..];
        while let Some(first) = window.first() {
            if first.role != Role::Tool {
                break;
            }
            window = &window[1..];
        }
        window
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.updated_at = Utc::now();
    }
}
