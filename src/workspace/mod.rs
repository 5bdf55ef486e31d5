//! Workspace: the shared directory agents work in.
//!
//! The workspace root holds markdown documents the agent reads and edits:
//! - **AGENTS.md, SOUL.md, USER.md, IDENTITY.md**: identity files composed
//!   into the system prompt
//! - **memory/MEMORY.md** and **memory/YYYY-MM-DD.md**: curated and daily notes
//! - **HEARTBEAT.md**: checklist re-read on every heartbeat tick
//!
//! Files are shared between every loop without file-level locking. Writes
//! made through [`Workspace::write_document`] replace the file atomically
//! (temp file + rename), so a reader sees either the old or the new
//! content, never a torn mix; concurrent writers resolve last-writer-wins.

mod document;

pub use document::{DocType, Document};

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::WorkspaceError;

/// Filesystem-backed workspace.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a document.
    pub fn path_of(&self, doc_type: DocType) -> PathBuf {
        self.root.join(doc_type.relative_path())
    }

    /// Read a document, `DocumentNotFound` if the file does not exist.
    pub async fn get_document(&self, doc_type: DocType) -> Result<Document, WorkspaceError> {
        let path = self.path_of(doc_type);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WorkspaceError::DocumentNotFound { path });
            }
            Err(e) => {
                return Err(WorkspaceError::Io {
                    path,
                    reason: e.to_string(),
                });
            }
        };

        let updated_at = tokio::fs::metadata(&path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from);

        Ok(Document {
            doc_type,
            path,
            content,
            updated_at,
        })
    }

    /// Get the heartbeat checklist (HEARTBEAT.md), `None` when absent.
    pub async fn heartbeat_checklist(&self) -> Result<Option<String>, WorkspaceError> {
        match self.get_document(DocType::Heartbeat).await {
            Ok(doc) => Ok(Some(doc.content)),
            Err(WorkspaceError::DocumentNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replace a document's content atomically.
    pub async fn write_document(&self, doc_type: DocType, content: &str) -> Result<(), WorkspaceError> {
        let path = self.path_of(doc_type);
        let io_err = |path: &Path, e: std::io::Error| WorkspaceError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(parent, e))?;
        }

        let tmp = path.with_extension(format!("md.{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| io_err(tmp.as_path(), e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(path.as_path(), e));
        }
        Ok(())
    }

    /// Build the system prompt from identity files and long-term memory.
    ///
    /// Missing files are skipped.
    pub async fn system_prompt(&self) -> Result<String, WorkspaceError> {
        let mut parts = vec![format!(
            "You are nanoclaw, a personal automation agent.\n\n\
             Current time: {}\nWorkspace: {}",
            Utc::now().format("%Y-%m-%d %H:%M (%A) UTC"),
            self.root.display()
        )];

        let sections = [
            (DocType::Agents, "## Agent Instructions"),
            (DocType::Soul, "## Core Values"),
            (DocType::User, "## User Context"),
            (DocType::Identity, "## Identity"),
            (DocType::Memory, "## Long-term Memory"),
        ];

        for (doc_type, header) in sections {
            match self.get_document(doc_type).await {
                Ok(doc) if !doc.is_blank() => {
                    parts.push(format!("{}\n\n{}", header, doc.content.trim()));
                }
                Ok(_) | Err(WorkspaceError::DocumentNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(parts.join("\n\n---\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_heartbeat_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        assert_eq!(ws.heartbeat_checklist().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_then_read_heartbeat() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.write_document(DocType::Heartbeat, "- [ ] water plants\n")
            .await
            .unwrap();
        ws.write_document(DocType::Heartbeat, "- [x] water plants\n")
            .await
            .unwrap();

        assert_eq!(
            ws.heartbeat_checklist().await.unwrap().as_deref(),
            Some("- [x] water plants\n")
        );
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_system_prompt_includes_identity_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("SOUL.md"), "Be kind.").unwrap();
        std::fs::write(dir.path().join("USER.md"), "   ").unwrap();
        let ws = Workspace::new(dir.path());

        let prompt = ws.system_prompt().await.unwrap();
        assert!(prompt.contains("## Core Values\n\nBe kind."));
        assert!(!prompt.contains("## User Context"));
    }
}
