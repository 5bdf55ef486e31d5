//! Submission types for the conversation worker.
//!
//! Every inbound message is turned into a [`Submission`] before the worker
//! acts on it: user text starts a turn, internal reports start a turn on the
//! owner's behalf, and a few slash commands control the session.

use serde::{Deserialize, Serialize};

use crate::channels::IncomingMessage;

/// A submission to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Submission {
    /// User text input (starts a new turn).
    UserInput {
        /// The user's message content.
        content: String,
    },

    /// A report produced inside the process (subagent result, job output).
    /// Starts a turn so the agent can relay it to the user.
    SystemReport {
        /// Who produced the report, e.g. `subagent`.
        sender: String,
        content: String,
    },

    /// Clear the conversation history and start fresh.
    Clear,
}

impl Submission {
    /// Create a user input submission.
    pub fn user_input(content: impl Into<String>) -> Self {
        Self::UserInput {
            content: content.into(),
        }
    }

    /// Classify an inbound message.
    pub fn from_message(msg: &IncomingMessage) -> Self {
        if msg.is_system() {
            return Self::SystemReport {
                sender: msg.sender_id.clone(),
                content: msg.content.clone(),
            };
        }
        match msg.content.trim() {
            "/clear" | "/new" => Self::Clear,
            _ => Self::user_input(msg.content.clone()),
        }
    }

    /// Check if this submission starts a new turn.
    pub fn starts_turn(&self) -> bool {
        matches!(self, Self::UserInput { .. } | Self::SystemReport { .. })
    }

    /// Check if this submission is a control command.
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Clear)
    }

    /// Text the turn starts from.
    pub fn turn_input(&self) -> Option<String> {
        match self {
            Self::UserInput { content } => Some(content.clone()),
            Self::SystemReport { sender, content } => {
                Some(format!("[System message from {}]\n\n{}", sender, content))
            }
            Self::Clear => None,
        }
    }
}

/// Result of processing a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    /// Turn completed with a response.
    Response {
        /// The agent's response.
        content: String,
    },

    /// Successfully processed (for control commands).
    Ok {
        /// Optional message.
        message: Option<String>,
    },

    /// Error occurred.
    Error {
        /// Error message.
        message: String,
    },
}

impl SubmissionResult {
    /// Create a response result.
    pub fn response(content: impl Into<String>) -> Self {
        Self::Response {
            content: content.into(),
        }
    }

    /// Create an OK result with a message.
    pub fn ok_with_message(message: impl Into<String>) -> Self {
        Self::Ok {
            message: Some(message.into()),
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Text to send back to the user, if any.
    pub fn reply_text(&self) -> Option<&str> {
        match self {
            Self::Response { content } => Some(content),
            Self::Ok { message } => message.as_deref(),
            Self::Error { message } => Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_types() {
        let input = Submission::user_input("Hello");
        assert!(input.starts_turn());
        assert!(!input.is_control());

        let clear = Submission::from_message(&IncomingMessage::new("tg", "1", " /clear "));
        assert_eq!(clear, Submission::Clear);
        assert!(!clear.starts_turn());
        assert!(clear.is_control());
    }

    #[test]
    fn test_system_message_becomes_report() {
        let msg = IncomingMessage::system("subagent", "tg:1", "[Subagent 'x' completed successfully]");
        let sub = Submission::from_message(&msg);
        assert!(sub.starts_turn());
        assert_eq!(
            sub.turn_input().unwrap(),
            "[System message from subagent]\n\n[Subagent 'x' completed successfully]"
        );
    }
}
