//! Command executor behavior against real processes.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use nanoclaw::context::{CallerId, ExecutionContext};
use nanoclaw::error::ErrorKind;
use nanoclaw::safety::SafetyPolicy;
use nanoclaw::sandbox::CommandExecutor;
use nanoclaw::tools::ToolError;

fn executor() -> CommandExecutor {
    CommandExecutor::new(Arc::new(SafetyPolicy::new(&[], &[]).unwrap()))
}

fn ctx(root: &Path) -> ExecutionContext {
    ExecutionContext::new(root, CallerId::Job("it".to_string())).with_workspace_root(root)
}

/// Running, as opposed to gone or a zombie waiting to be reaped.
fn is_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => {
            // State follows the parenthesised command name.
            let state = stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next());
            !matches!(state, Some("Z") | Some("X"))
        }
        Err(_) => false,
    }
}

#[tokio::test]
async fn test_timeout_leaves_no_background_children() {
    if !Path::new("/proc/self/stat").exists() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("child.pid");
    let command = format!("sleep 30 & echo $! > {}; wait", pid_file.display());

    let err = executor()
        .execute(&command, &ctx(dir.path()).with_timeout(Duration::from_millis(500)))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Timeout(_)));

    let pid: u32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();

    let mut alive = true;
    for _ in 0..20 {
        alive = is_alive(pid);
        if !alive {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!alive, "background child {pid} survived the timeout");
}

#[tokio::test]
async fn test_denylist_blocks_before_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let command = format!("touch {} && rm -rf /", marker.display());

    let result = executor().run(&command, &ctx(dir.path())).await;
    assert_eq!(result.kind(), Some(ErrorKind::PolicyViolation));
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_working_dir_outside_workspace_denied() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("ws");
    std::fs::create_dir(&root).unwrap();

    let outside = ctx(&root).with_working_dir(dir.path());
    let result = executor().run("ls", &outside).await;
    assert_eq!(result.kind(), Some(ErrorKind::PolicyViolation));
}

#[tokio::test]
async fn test_large_output_is_truncated_with_marker() {
    let dir = tempfile::tempdir().unwrap();
    let out = executor()
        .execute("yes x | head -c 5000", &ctx(dir.path()).with_max_output(1000))
        .await
        .unwrap();

    assert!(out.truncated);
    assert!(out.output.starts_with(&"x\n".repeat(500)));
    assert!(out.output.contains("truncated, 4000 more bytes"));
}
