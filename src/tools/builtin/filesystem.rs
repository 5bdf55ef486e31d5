//! File tools for the shared workspace.
//!
//! These tools allow the agent to:
//! - Read a file, or list a directory
//! - Write a whole file, or replace one exact snippet inside it
//!
//! Paths resolve against the call's working directory and are checked
//! against the safety policy before any I/O. Writes go through a temp file
//! and a rename, so readers never see a half-written file. They are not
//! coordinated across loops: two writers to the same file race and the
//! last one wins.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::safety::{Decision, SafetyPolicy};
use crate::tools::tool::{SideEffect, Tool, ToolError, ToolOutput, require_str};

/// Write `content` to a sibling temp file, then rename it over `path`.
async fn replace_file(path: &Path, content: &str) -> Result<(), ToolError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()));
    tokio::fs::write(&tmp, content)
        .await
        .map_err(|e| io_error("Writing", &tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_error("Writing", path, e));
    }
    Ok(())
}

fn confined_path(
    policy: &SafetyPolicy,
    params: &serde_json::Value,
    ctx: &ExecutionContext,
) -> Result<PathBuf, ToolError> {
    let raw = require_str(params, "path")?;
    let path = ctx.resolve_path(raw);
    match policy.check_path(&path, ctx) {
        Decision::Allow => Ok(path),
        Decision::Deny(reason) => Err(ToolError::PolicyViolation(reason)),
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> ToolError {
    ToolError::ExecutionFailed(format!("{} {} failed: {}", action, path.display(), e))
}

/// Tool for reading a file.
pub struct ReadFileTool {
    policy: Arc<SafetyPolicy>,
}

impl ReadFileTool {
    pub fn new(policy: Arc<SafetyPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the given path."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let path = confined_path(&self.policy, &params, ctx)?;

        if !path.is_file() {
            return Err(ToolError::ExecutionFailed(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| io_error("Reading", &path, e))?;

        Ok(ToolOutput::text(content, start.elapsed()))
    }
}

/// Tool for writing a whole file, creating parent directories.
pub struct WriteFileTool {
    policy: Arc<SafetyPolicy>,
}

impl WriteFileTool {
    pub fn new(policy: Arc<SafetyPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file at the given path. Creates parent directories if needed \
         and replaces any existing content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Mutating
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let path = confined_path(&self.policy, &params, ctx)?;
        let content = require_str(&params, "content")?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("Creating", parent, e))?;
        }
        replace_file(&path, content).await?;

        Ok(ToolOutput::text(
            format!("Successfully wrote {} bytes to {}", content.len(), path.display()),
            start.elapsed(),
        ))
    }
}

/// Tool for replacing one exact snippet in a file.
pub struct EditFileTool {
    policy: Arc<SafetyPolicy>,
}

impl EditFileTool {
    pub fn new(policy: Arc<SafetyPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing old_text with new_text. old_text must appear exactly \
         once in the file."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to edit"
                },
                "old_text": {
                    "type": "string",
                    "description": "The exact text to find and replace",
                    "minLength": 1
                },
                "new_text": {
                    "type": "string",
                    "description": "The text to replace it with"
                }
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::Mutating
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let path = confined_path(&self.policy, &params, ctx)?;
        let old_text = require_str(&params, "old_text")?;
        let new_text = require_str(&params, "new_text")?;

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| io_error("Reading", &path, e))?;

        match content.matches(old_text).count() {
            0 => {
                return Err(ToolError::InvalidParameters(
                    "old_text not found in file. Make sure it matches exactly.".to_string(),
                ));
            }
            1 => {}
            n => {
                return Err(ToolError::InvalidParameters(format!(
                    "old_text appears {} times. Provide more context to make it unique.",
                    n
                )));
            }
        }

        let updated = content.replacen(old_text, new_text, 1);
        replace_file(&path, &updated).await?;

        Ok(ToolOutput::text(
            format!("Successfully edited {}", path.display()),
            start.elapsed(),
        ))
    }
}

/// Tool for listing a directory.
pub struct ListDirTool {
    policy: Arc<SafetyPolicy>,
}

impl ListDirTool {
    pub fn new(policy: Arc<SafetyPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the contents of a directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The directory path to list"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let path = confined_path(&self.policy, &params, ctx)?;

        let mut reader = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| io_error("Listing", &path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| io_error("Listing", &path, e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(if is_dir { format!("{}/", name) } else { name });
        }
        entries.sort();

        let output = if entries.is_empty() {
            format!("Directory {} is empty", path.display())
        } else {
            entries.join("\n")
        };
        Ok(ToolOutput::text(output, start.elapsed()))
    }
}
