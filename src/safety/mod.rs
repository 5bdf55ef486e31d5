//! Command safety policy.
//!
//! A lexical filter that runs before anything is spawned or any file is
//! touched. It looks only at the command text and the execution context,
//! never at the filesystem.
//!
//! Rules, first match wins:
//! 1. Destructive patterns (recursive delete, disk formatting, raw device
//!    writes, power control, fork bombs) are denied.
//! 2. With a workspace root set, a working directory or path argument that
//!    escapes the root is denied.
//! 3. With an allowlist configured, commands matching none of it are denied.
//! 4. Everything else is allowed.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::context::{ExecutionContext, is_within};
use crate::error::ConfigError;

/// Reason reported for denylist hits.
pub const DENY_DESTRUCTIVE: &str = "blocked: destructive command";
/// Reason reported for confinement violations.
pub const DENY_OUTSIDE_WORKSPACE: &str = "blocked: path outside workspace";
/// Reason reported when an allowlist is configured and nothing matched.
pub const DENY_NOT_ALLOWED: &str = "blocked: not in allowlist";

/// Patterns matched against the lowercased command text.
const BUILTIN_DENY_PATTERNS: &[&str] = &[
    // rm with a recursive or force flag anywhere in its arguments
    r"\brm\s+(?:[^;&|]*\s)?-[a-z]*[rf]",
    r"\brm\s+(?:[^;&|]*\s)?--(?:recursive|force)\b",
    r"\bdel\s+/[fq]\b",
    r"\brmdir\s+/s\b",
    r"(?:^|[;&|]\s*)format\b",
    r"\b(?:mkfs|diskpart)\b",
    r"\bdd\s+if=",
    r">\s*/dev/(?:sd|hd|vd|nvme|disk)",
    r"\b(?:shutdown|reboot|poweroff)\b",
    r":\(\)\s*\{.*\};\s*:",
];

/// Device paths commands may always reference (redirections mostly).
const SAFE_DEVICE_PATHS: &[&str] = &["/dev/null", "/dev/stdout", "/dev/stderr", "/dev/zero"];

static BUILTIN_DENY: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    BUILTIN_DENY_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    fn deny(reason: &str) -> Self {
        Decision::Deny(reason.to_string())
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// The denial reason, if denied.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Allow => None,
            Decision::Deny(reason) => Some(reason),
        }
    }
}

/// Stateless command and path filter shared by every executor.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    deny: Vec<Regex>,
    allow: Vec<Regex>,
}

impl SafetyPolicy {
    /// Build a policy from the built-in denylist plus configured patterns.
    pub fn new(extra_deny: &[String], allow: &[String]) -> Result<Self, ConfigError> {
        let mut deny = BUILTIN_DENY.clone();
        deny.extend(compile_all("exec.deny_patterns", extra_deny)?);
        let allow = compile_all("exec.allow_patterns", allow)?;
        Ok(Self { deny, allow })
    }

    /// Evaluate a shell command about to run under `ctx`.
    pub fn evaluate(&self, command: &str, ctx: &ExecutionContext) -> Decision {
        let lower = command.trim().to_lowercase();

        if self.deny.iter().any(|re| re.is_match(&lower)) {
            return Decision::deny(DENY_DESTRUCTIVE);
        }

        if let Some(ref root) = ctx.workspace_root {
            if !is_within(&ctx.working_dir, root) {
                return Decision::deny(DENY_OUTSIDE_WORKSPACE);
            }

            for candidate in path_candidates(command) {
                let resolved = ctx.resolve_path(&candidate);
                if !is_within(&resolved, root) && !is_safe_device(&resolved) {
                    return Decision::deny(DENY_OUTSIDE_WORKSPACE);
                }
            }
        }

        if !self.allow.is_empty() && !self.allow.iter().any(|re| re.is_match(&lower)) {
            return Decision::deny(DENY_NOT_ALLOWED);
        }

        Decision::Allow
    }

    /// Check a path a file tool is about to touch.
    pub fn check_path(&self, path: &Path, ctx: &ExecutionContext) -> Decision {
        match ctx.workspace_root {
            Some(ref root) if !is_within(path, root) => Decision::deny(DENY_OUTSIDE_WORKSPACE),
            _ => Decision::Allow,
        }
    }
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            deny: BUILTIN_DENY.clone(),
            allow: Vec::new(),
        }
    }
}

fn compile_all(key: &str, patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&p.to_lowercase()).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("invalid regex '{}': {}", p, e),
            })
        })
        .collect()
}

fn is_safe_device(path: &Path) -> bool {
    SAFE_DEVICE_PATHS.iter().any(|p| path == Path::new(p))
}

/// Tokens in a command that look like they could point outside the
/// working directory: absolute paths, home-relative paths, and anything
/// with a `..` segment. Plain relative names cannot escape a confined cwd.
fn path_candidates(command: &str) -> Vec<String> {
    command
        .split(|c: char| c.is_whitespace() || matches!(c, ';' | '|' | '&' | '(' | ')'))
        .filter_map(|token| {
            let token = token.trim_matches(|c| c == '"' || c == '\'' || c == '`');
            if token.is_empty() || token.contains("://") {
                return None;
            }
            // Redirections (`2>/dev/null`, `</etc/x`) and `--opt=/path`.
            let token = match token.rfind(['>', '<', '=']) {
                Some(idx) => &token[idx + 1..],
                None => token,
            };
            let is_candidate = token.starts_with('/')
                || token.starts_with('~')
                || token == ".."
                || token.starts_with("../")
                || token.contains("/../")
                || token.ends_with("/..");
            is_candidate.then(|| token.to_string())
        })
        .collect()
}
