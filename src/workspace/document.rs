//! Workspace document types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Document type in the workspace.
///
/// Each type maps to a markdown file under the workspace root:
/// - **Memory**: Long-term curated facts and decisions (memory/MEMORY.md)
/// - **Identity**: Agent name and personality (IDENTITY.md)
/// - **Soul**: Core values and behavior principles (SOUL.md)
/// - **Agents**: Behavior instructions (AGENTS.md)
/// - **User**: User context (USER.md)
/// - **Heartbeat**: Periodic checklist reviewed on every heartbeat (HEARTBEAT.md)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Memory,
    Identity,
    Soul,
    Agents,
    User,
    Heartbeat,
}

impl DocType {
    /// Path of the document relative to the workspace root.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(match self {
            DocType::Memory => "memory/MEMORY.md",
            DocType::Identity => "IDENTITY.md",
            DocType::Soul => "SOUL.md",
            DocType::Agents => "AGENTS.md",
            DocType::User => "USER.md",
            DocType::Heartbeat => "HEARTBEAT.md",
        })
    }
}

/// A document read from the workspace.
#[derive(Debug, Clone)]
pub struct Document {
    pub doc_type: DocType,
    /// Absolute path of the backing file.
    pub path: PathBuf,
    pub content: String,
    /// File modification time, when the filesystem reports one.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Check if the document has no meaningful content.
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths() {
        assert_eq!(DocType::Heartbeat.relative_path(), PathBuf::from("HEARTBEAT.md"));
        assert_eq!(DocType::Memory.relative_path(), PathBuf::from("memory/MEMORY.md"));
    }

    #[test]
    fn test_doc_type_serializes_snake_case() {
        let json = serde_json::to_string(&DocType::Heartbeat).unwrap();
        assert_eq!(json, "\"heartbeat\"");
    }

    #[test]
    fn test_whitespace_document_is_blank() {
        let mut doc = Document {
            doc_type: DocType::Heartbeat,
            path: PathBuf::from("/ws/HEARTBEAT.md"),
            content: " \n\t\n".to_string(),
            updated_at: None,
        };
        assert!(doc.is_blank());

        doc.content = "- [ ] water plants".to_string();
        assert!(!doc.is_blank());
    }
}
