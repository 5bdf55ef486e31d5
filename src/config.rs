//! Configuration.
//!
//! Values are layered: built-in defaults, then the TOML file
//! (`~/.nanoclaw/config.toml` unless another path is given), then
//! `NANOCLAW_*` environment variables. Configuration is read once at boot;
//! nothing built from it changes afterwards.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::{HeartbeatConfig, LoopBudget, WorkerConfig};
use crate::context::ExecutionDefaults;
use crate::error::ConfigError;

/// Base directory for nanoclaw state.
pub fn nanoclaw_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nanoclaw")
}

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    nanoclaw_home().join("config.toml")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
    /// Confine tool paths and working directories to `root`.
    pub restrict_to_workspace: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: nanoclaw_home().join("workspace"),
            restrict_to_workspace: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    pub timeout_secs: u64,
    pub max_output_bytes: usize,
    /// Regexes denied on top of the built-in destructive patterns.
    pub deny_patterns: Vec<String>,
    /// When non-empty, only commands matching one of these run.
    pub allow_patterns: Vec<String>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_output_bytes: 10_000,
            deny_patterns: Vec::new(),
            allow_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_steps: usize,
    pub max_turn_secs: u64,
    pub history_window: usize,
    /// JSONL token usage ledger. Disabled when unset.
    pub usage_log: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 20,
            max_turn_secs: 300,
            history_window: 50,
            usage_log: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubagentConfig {
    pub max_concurrent_per_owner: usize,
    pub max_steps: usize,
    pub max_duration_secs: u64,
}

impl Default for SubagentConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_owner: 4,
            max_steps: 15,
            max_duration_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_secs: u64,
    pub store_path: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            store_path: nanoclaw_home().join("cron").join("jobs.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    /// `channel:chat_id` that receives heartbeat findings.
    pub notify: Option<String>,
    pub max_steps: usize,
    pub max_duration_secs: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30 * 60,
            notify: None,
            max_steps: 15,
            max_duration_secs: 300,
        }
    }
}

/// Full configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub exec: ExecConfig,
    pub agent: AgentConfig,
    pub subagent: SubagentConfig,
    pub scheduler: SchedulerConfig,
    pub heartbeat: HeartbeatSettings,
}

impl Config {
    /// Load defaults, the config file and the process environment.
    ///
    /// An explicitly given file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file on top of the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply `NANOCLAW_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(root) = lookup("NANOCLAW_WORKSPACE") {
            self.workspace.root = PathBuf::from(root);
        }
        if let Some(v) = parse_env(&lookup, "NANOCLAW_RESTRICT_TO_WORKSPACE")? {
            self.workspace.restrict_to_workspace = v;
        }
        if let Some(v) = parse_env(&lookup, "NANOCLAW_EXEC_TIMEOUT_SECS")? {
            self.exec.timeout_secs = v;
        }
        if let Some(v) = parse_env(&lookup, "NANOCLAW_EXEC_MAX_OUTPUT")? {
            self.exec.max_output_bytes = v;
        }
        if let Some(v) = parse_env(&lookup, "NANOCLAW_MAX_SUBAGENTS")? {
            self.subagent.max_concurrent_per_owner = v;
        }
        if let Some(path) = lookup("NANOCLAW_CRON_STORE") {
            self.scheduler.store_path = PathBuf::from(path);
        }
        if let Some(v) = parse_env(&lookup, "NANOCLAW_HEARTBEAT_INTERVAL_SECS")? {
            self.heartbeat.interval_secs = v;
        }
        if let Some(v) = parse_env(&lookup, "NANOCLAW_HEARTBEAT_ENABLED")? {
            self.heartbeat.enabled = v;
        }
        Ok(())
    }

    /// Reject values nothing can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("exec.timeout_secs", self.exec.timeout_secs as usize),
            ("exec.max_output_bytes", self.exec.max_output_bytes),
            ("agent.max_steps", self.agent.max_steps),
            ("agent.max_turn_secs", self.agent.max_turn_secs as usize),
            ("subagent.max_concurrent_per_owner", self.subagent.max_concurrent_per_owner),
            ("subagent.max_steps", self.subagent.max_steps),
            ("scheduler.tick_secs", self.scheduler.tick_secs as usize),
            ("heartbeat.interval_secs", self.heartbeat.interval_secs as usize),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if let Some(ref target) = self.heartbeat.notify
            && !target.contains(':')
        {
            return Err(ConfigError::InvalidValue {
                key: "heartbeat.notify".to_string(),
                reason: format!("expected channel:chat_id, got '{}'", target),
            });
        }
        Ok(())
    }

    /// Template for every tool call's execution context.
    pub fn execution_defaults(&self) -> ExecutionDefaults {
        ExecutionDefaults {
            working_dir: self.workspace.root.clone(),
            workspace_root: self
                .workspace
                .restrict_to_workspace
                .then(|| self.workspace.root.clone()),
            timeout: Duration::from_secs(self.exec.timeout_secs),
            max_output_bytes: self.exec.max_output_bytes,
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            history_window: self.agent.history_window,
            budget: LoopBudget::new(
                self.agent.max_steps,
                Duration::from_secs(self.agent.max_turn_secs),
            ),
        }
    }

    pub fn subagent_budget(&self) -> LoopBudget {
        LoopBudget::new(
            self.subagent.max_steps,
            Duration::from_secs(self.subagent.max_duration_secs),
        )
    }

    pub fn heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            enabled: self.heartbeat.enabled,
            interval: Duration::from_secs(self.heartbeat.interval_secs),
            notify: self.heartbeat.notify.clone(),
            budget: LoopBudget::new(
                self.heartbeat.max_steps,
                Duration::from_secs(self.heartbeat.max_duration_secs),
            ),
        }
    }
}

fn parse_env<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("'{}': {}", raw, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.exec.timeout_secs, 60);
        assert_eq!(config.exec.max_output_bytes, 10_000);
        assert_eq!(config.agent.history_window, 50);
        assert_eq!(config.subagent.max_concurrent_per_owner, 4);
        assert!(config.workspace.restrict_to_workspace);
        config.validate().unwrap();
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[exec]
timeout_secs = 5
deny_patterns = ["\\bcurl\\b"]

[heartbeat]
notify = "telegram:42"
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.exec.timeout_secs, 5);
        assert_eq!(config.exec.deny_patterns, vec!["\\bcurl\\b".to_string()]);
        assert_eq!(config.exec.max_output_bytes, 10_000);
        assert_eq!(config.heartbeat.notify.as_deref(), Some("telegram:42"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("NANOCLAW_WORKSPACE", "/srv/ws"),
                ("NANOCLAW_RESTRICT_TO_WORKSPACE", "false"),
                ("NANOCLAW_MAX_SUBAGENTS", "2"),
            ]))
            .unwrap();

        assert_eq!(config.workspace.root, PathBuf::from("/srv/ws"));
        assert_eq!(config.subagent.max_concurrent_per_owner, 2);
        assert_eq!(config.execution_defaults().workspace_root, None);
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("NANOCLAW_EXEC_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "NANOCLAW_EXEC_TIMEOUT_SECS"));
    }

    #[test]
    fn test_validate_rejects_zero_and_bad_target() {
        let mut config = Config::default();
        config.subagent.max_concurrent_per_owner = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.heartbeat.notify = Some("telegram".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = Config::load(Some(Path::new("/nonexistent/nanoclaw.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
