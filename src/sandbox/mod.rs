//! Sandboxed shell command execution.
//!
//! [`CommandExecutor`] runs one shell command at a time under the limits of
//! its [`ExecutionContext`]:
//!
//! - the [`SafetyPolicy`] is consulted first; denied commands never spawn
//! - stdout and stderr are captured as one stream, up to the output ceiling
//! - on timeout the whole process group is killed, not just the shell
//! - expected failures (spawn errors, non-zero exit) become classified
//!   results instead of propagating

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use crate::context::ExecutionContext;
use crate::safety::{Decision, SafetyPolicy};
use crate::tools::{ToolError, ToolResult};

const READ_CHUNK: usize = 8192;

/// Captured result of a command that exited with status zero.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Combined stdout and stderr, with a truncation marker when cut.
    pub output: String,
    /// Whether the output was cut at the ceiling.
    pub truncated: bool,
    /// Process exit code.
    pub exit_code: i32,
    /// Wall-clock time spent.
    pub duration: Duration,
}

/// Runs shell commands under the shared safety policy.
pub struct CommandExecutor {
    policy: Arc<SafetyPolicy>,
}

impl CommandExecutor {
    /// Create an executor bound to a policy.
    pub fn new(policy: Arc<SafetyPolicy>) -> Self {
        Self { policy }
    }

    /// The policy this executor enforces.
    pub fn policy(&self) -> &Arc<SafetyPolicy> {
        &self.policy
    }

    /// Run a command and fold the outcome into a [`ToolResult`].
    pub async fn run(&self, command: &str, ctx: &ExecutionContext) -> ToolResult {
        match self.execute(command, ctx).await {
            Ok(out) => ToolResult::success(out.output),
            Err(err) => ToolResult::from(err),
        }
    }

    /// Run a command, returning the captured output or a classified error.
    pub async fn execute(
        &self,
        command: &str,
        ctx: &ExecutionContext,
    ) -> Result<ExecOutput, ToolError> {
        if let Decision::Deny(reason) = self.policy.evaluate(command, ctx) {
            tracing::warn!(caller = %ctx.caller, command = command, reason = %reason, "Command denied by safety policy");
            return Err(ToolError::PolicyViolation(reason));
        }

        let start = Instant::now();
        let mut cmd = shell_command(command);
        cmd.current_dir(&ctx.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(path) = path_with_workspace_bin(ctx.workspace_root.as_deref()) {
            cmd.env("PATH", path);
        }

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            ToolError::ExecutionFailed(format!(
                "failed to start command in {}: {}",
                ctx.working_dir.display(),
                e
            ))
        })?;

        // The child leads its own process group, so its pid doubles as the
        // group id even after the leader itself has been reaped.
        let group_id = child.id();

        tracing::debug!(caller = %ctx.caller, pid = ?group_id, command = command, "Spawned command");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = ctx.max_output_bytes;

        let run = async { tokio::join!(capture_output(stdout, stderr, limit), child.wait()) };

        let (captured, status) = match tokio::time::timeout(ctx.timeout, run).await {
            Ok(done) => done,
            Err(_) => {
                terminate(&mut child, group_id).await;
                tracing::warn!(
                    caller = %ctx.caller,
                    timeout_secs = ctx.timeout.as_secs(),
                    command = command,
                    "Command timed out and was killed"
                );
                return Err(ToolError::Timeout(ctx.timeout));
            }
        };

        let status = status.map_err(|e| {
            ToolError::ExecutionFailed(format!("failed to wait for command: {}", e))
        })?;

        let truncated = captured.dropped > 0;
        let mut output = String::from_utf8_lossy(&captured.buf).into_owned();
        if truncated {
            output.push_str(&truncation_marker(captured.dropped));
        }
        if output.is_empty() {
            output.push_str("(no output)");
        }

        let exit_code = status.code().unwrap_or(-1);
        let duration = start.elapsed();

        tracing::debug!(
            caller = %ctx.caller,
            exit_code = exit_code,
            truncated = truncated,
            elapsed_ms = duration.as_millis() as u64,
            "Command finished"
        );

        if !status.success() {
            return Err(ToolError::NonZeroExit { exit_code, output });
        }

        Ok(ExecOutput {
            output,
            truncated,
            exit_code,
            duration,
        })
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// PATH with `<workspace>/bin` prepended, if that directory exists.
fn path_with_workspace_bin(root: Option<&Path>) -> Option<std::ffi::OsString> {
    let bin = root?.join("bin");
    if !bin.is_dir() {
        return None;
    }
    let current = std::env::var_os("PATH").unwrap_or_default();
    let mut paths = vec![bin];
    paths.extend(std::env::split_paths(&current));
    std::env::join_paths(paths).ok()
}

/// Kill the child's whole process group, then reap the child.
async fn terminate(child: &mut Child, group_id: Option<u32>) {
    #[cfg(unix)]
    if let Some(pgid) = group_id.and_then(|id| i32::try_from(id).ok()) {
        // SAFETY: kill(2) with a negative pid signals every process in the
        // group; it has no memory-safety preconditions.
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = group_id;

    if let Err(e) = child.kill().await {
        tracing::debug!("Child already exited while killing: {}", e);
    }
}

/// Bytes kept from a process, plus the count of bytes discarded.
#[derive(Debug, Default)]
struct Captured {
    buf: Vec<u8>,
    dropped: usize,
}

impl Captured {
    fn push(&mut self, chunk: &[u8], limit: usize) {
        let room = limit.saturating_sub(self.buf.len());
        let take = room.min(chunk.len());
        self.buf.extend_from_slice(&chunk[..take]);
        self.dropped += chunk.len() - take;
    }
}

/// Read stdout and stderr concurrently into one buffer in arrival order.
///
/// Past the limit, chunks are still drained (and counted) so the child
/// never blocks on a full pipe; it runs to completion or to its timeout.
async fn capture_output<O, E>(mut stdout: Option<O>, mut stderr: Option<E>, limit: usize) -> Captured
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let mut out_buf = vec![0u8; READ_CHUNK];
    let mut err_buf = vec![0u8; READ_CHUNK];

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            read = read_chunk(&mut stdout, &mut out_buf), if stdout.is_some() => match read {
                Ok(0) | Err(_) => stdout = None,
                Ok(n) => captured.push(&out_buf[..n], limit),
            },
            read = read_chunk(&mut stderr, &mut err_buf), if stderr.is_some() => match read {
                Ok(0) | Err(_) => stderr = None,
                Ok(n) => captured.push(&err_buf[..n], limit),
            },
        }
    }

    captured
}

async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match reader {
        Some(r) => r.read(buf).await,
        None => std::future::pending().await,
    }
}

fn truncation_marker(dropped: usize) -> String {
    format!("\n... (truncated, {} more bytes)", dropped)
}

/// Cut `text` to at most `limit` bytes on a char boundary, appending the
/// truncation marker when anything was removed.
///
/// Shared by the dispatcher so every tool obeys the same ceiling and marker.
pub fn truncate_output(text: &str, limit: usize) -> (String, bool) {
    if text.len() <= limit {
        return (text.to_string(), false);
    }
    let mut cut = limit;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = text[..cut].to_string();
    out.push_str(&truncation_marker(text.len() - cut));
    (out, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallerId;
    use crate::error::ErrorKind;

    fn executor() -> CommandExecutor {
        CommandExecutor::new(Arc::new(SafetyPolicy::default()))
    }

    fn ctx(dir: &Path) -> ExecutionContext {
        ExecutionContext::new(dir, CallerId::Conversation("test:1".to_string()))
    }

    #[test]
    fn test_truncate_output_marks_iff_longer() {
        let (short, cut) = truncate_output("hello", 5);
        assert_eq!(short, "hello");
        assert!(!cut);

        let (long, cut) = truncate_output("hello world", 5);
        assert!(cut);
        assert!(long.starts_with("hello\n"));
        assert!(long.contains("(truncated, 6 more bytes)"));
    }

    #[test]
    fn test_truncate_output_respects_char_boundaries() {
        let (out, cut) = truncate_output("héllo", 2);
        assert!(cut);
        assert!(out.starts_with('h'));
        assert!(!out.starts_with("hé"));
    }

    #[test]
    fn test_captured_push_counts_dropped_bytes() {
        let mut captured = Captured::default();
        captured.push(b"abcdef", 4);
        captured.push(b"gh", 4);
        assert_eq!(captured.buf, b"abcd");
        assert_eq!(captured.dropped, 4);
    }

    #[tokio::test]
    async fn test_denied_command_does_not_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let cmd = format!("rm -rf nothing; touch {}", marker.display());

        let result = executor().run(&cmd, &ctx(dir.path())).await;

        assert_eq!(result.kind(), Some(ErrorKind::PolicyViolation));
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let out = executor()
            .execute("echo out; echo err 1>&2", &ctx(dir.path()))
            .await
            .unwrap();
        assert!(out.output.contains("out"));
        assert!(out.output.contains("err"));
        assert!(!out.truncated);
        assert_eq!(out.exit_code, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_keeps_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = executor()
            .execute("echo diagnostic; exit 3", &ctx(dir.path()))
            .await
            .unwrap_err();
        match err {
            ToolError::NonZeroExit { exit_code, output } => {
                assert_eq!(exit_code, 3);
                assert!(output.contains("diagnostic"));
            }
            other => panic!("expected NonZeroExit, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_truncated_at_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path()).with_max_output(100);
        let out = executor()
            .execute("head -c 5000 /dev/zero | tr '\\0' 'a'", &ctx)
            .await
            .unwrap();
        assert!(out.truncated);
        assert!(out.output.starts_with(&"a".repeat(100)));
        assert!(out.output.contains("(truncated, 4900 more bytes)"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_reports_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path()).with_timeout(Duration::from_millis(300));
        let started = Instant::now();
        let result = executor().run("sleep 10", &ctx).await;
        assert_eq!(result.kind(), Some(ErrorKind::Timeout));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_working_dir_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir.path().join("does-not-exist"));
        let result = executor().run("echo hi", &ctx).await;
        assert_eq!(result.kind(), Some(ErrorKind::ExecutionError));
    }

    #[test]
    fn test_workspace_bin_prepended_when_present() {
        let dir = tempfile::tempdir().unwrap();
        assert!(path_with_workspace_bin(Some(dir.path())).is_none());

        std::fs::create_dir(dir.path().join("bin")).unwrap();
        let path = path_with_workspace_bin(Some(dir.path())).unwrap();
        let first = std::env::split_paths(&path).next().unwrap();
        assert_eq!(first, dir.path().join("bin"));
    }
}
