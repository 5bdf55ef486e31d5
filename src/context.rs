//! Per-invocation execution context.
//!
//! Every tool call gets its own [`ExecutionContext`] value, built from the
//! process-wide [`ExecutionDefaults`]. Contexts are never shared between
//! calls, so handlers are free to derive a modified copy (e.g. a different
//! working directory) without affecting anyone else.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use uuid::Uuid;

/// Default wall-clock limit for a single command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default ceiling on captured tool output.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10_000;

/// Identity of whoever issued a tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerId {
    /// A live conversation, keyed as `channel:chat_id`.
    Conversation(String),
    /// A scheduled job.
    Job(String),
    /// A background subagent working for `owner`.
    Subagent { id: Uuid, owner: String },
    /// The periodic heartbeat review.
    Heartbeat,
}

impl CallerId {
    /// Conversation (or pseudo-conversation) that results flow back to.
    pub fn reply_to(&self) -> String {
        match self {
            CallerId::Conversation(id) => id.clone(),
            CallerId::Job(id) => format!("cron:{}", id),
            CallerId::Subagent { owner, .. } => owner.clone(),
            CallerId::Heartbeat => "heartbeat:review".to_string(),
        }
    }
}

impl std::fmt::Display for CallerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallerId::Conversation(id) => write!(f, "conversation:{}", id),
            CallerId::Job(id) => write!(f, "job:{}", id),
            CallerId::Subagent { id, .. } => write!(f, "subagent:{}", id),
            CallerId::Heartbeat => write!(f, "heartbeat"),
        }
    }
}

/// Context handed to a single tool invocation.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Directory commands run in and relative paths resolve against.
    pub working_dir: PathBuf,
    /// Confinement boundary. `None` disables path confinement.
    pub workspace_root: Option<PathBuf>,
    /// Wall-clock limit for the invocation.
    pub timeout: Duration,
    /// Ceiling on returned output.
    pub max_output_bytes: usize,
    /// Who is calling.
    pub caller: CallerId,
}

impl ExecutionContext {
    /// Create a context with default limits and no confinement.
    pub fn new(working_dir: impl Into<PathBuf>, caller: CallerId) -> Self {
        Self {
            working_dir: working_dir.into(),
            workspace_root: None,
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            caller,
        }
    }

    /// Confine paths to `root`.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    pub fn with_working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = working_dir.into();
        self
    }

    /// Resolve a user-supplied path against the working directory.
    ///
    /// Purely lexical: `~` expands to the home directory, `.` and `..` are
    /// folded, nothing touches the filesystem.
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        let expanded = if raw == "~" {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"))
        } else if let Some(rest) = raw.strip_prefix("~/") {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/"))
                .join(rest)
        } else {
            PathBuf::from(raw)
        };

        if expanded.is_absolute() {
            normalize_path(&expanded)
        } else {
            normalize_path(&self.working_dir.join(expanded))
        }
    }
}

/// Process-wide template for execution contexts, fixed at boot.
#[derive(Debug, Clone)]
pub struct ExecutionDefaults {
    pub working_dir: PathBuf,
    pub workspace_root: Option<PathBuf>,
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

impl ExecutionDefaults {
    /// Build a fresh context for one invocation.
    pub fn context_for(&self, caller: CallerId) -> ExecutionContext {
        ExecutionContext {
            working_dir: self.working_dir.clone(),
            workspace_root: self.workspace_root.clone(),
            timeout: self.timeout,
            max_output_bytes: self.max_output_bytes,
            caller,
        }
    }
}

/// Lexically normalize a path: drop `.`, fold `..` into its parent.
///
/// `..` at the root stays at the root, matching how the kernel resolves it.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            Component::RootDir | Component::Prefix(_) | Component::Normal(_) => {
                out.push(component.as_os_str());
            }
        }
    }
    out
}

/// Whether `path` lies inside `root` after lexical normalization.
pub fn is_within(path: &Path, root: &Path) -> bool {
    normalize_path(path).starts_with(normalize_path(root))
}
