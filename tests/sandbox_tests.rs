//! Integration tests for the sandbox session
//!
//! The container runtime is the local-shell fake, so the full stuff/poll
//! protocol is exercised without Docker.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sandpiper::sandbox::{OutputStream, SandboxConfig, SandboxError, SandboxSession};
use sandpiper::test_support::ShellRuntime;

fn config(capture_dir: &Path) -> SandboxConfig {
    SandboxConfig {
        capture_dir: capture_dir.to_path_buf(),
        poll_interval: Duration::from_millis(20),
        startup_delay: Duration::ZERO,
        command_timeout: Some(Duration::from_secs(10)),
        ..Default::default()
    }
}

fn commands(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|l| l.to_string()).collect()
}

/// Test that outputs come back in order with their command echoes
#[tokio::test]
async fn test_run_commands_in_order() {
    let workspace = tempfile::tempdir().unwrap();
    let captures = tempfile::tempdir().unwrap();
    let session = SandboxSession::new(Arc::new(ShellRuntime::new()), workspace.path(), config(captures.path()));

    let output = session
        .run_commands(&commands(&["echo A", "", "echo B"]), None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output, "> echo A\nA\n\n\n> echo B\nB\n\n\n");
}

/// Test that shell state carries over and commands start in the workspace
#[tokio::test]
async fn test_shell_state_persists() {
    let workspace = tempfile::tempdir().unwrap();
    let captures = tempfile::tempdir().unwrap();
    std::fs::create_dir(workspace.path().join("sub")).unwrap();
    let session = SandboxSession::new(Arc::new(ShellRuntime::new()), workspace.path(), config(captures.path()));
    let cancel = CancellationToken::new();

    let first = session
        .run_commands(&commands(&["export GREETING=hello", "cd sub"]), None, &cancel)
        .await
        .unwrap();
    assert_eq!(first, "> export GREETING=hello\n\n\n> cd sub\n\n\n");

    let second = session
        .run_commands(&commands(&["echo $GREETING", "pwd"]), None, &cancel)
        .await
        .unwrap();
    // Variables survive; every batch starts from the workspace again
    let expected = format!(
        "> echo $GREETING\nhello\n\n\n> pwd\n{}\n\n\n",
        workspace.path().display()
    );
    assert_eq!(second, expected);
}

/// Test that every part of a compound command is captured
#[tokio::test]
async fn test_compound_commands_capture_all_output() {
    let workspace = tempfile::tempdir().unwrap();
    let captures = tempfile::tempdir().unwrap();
    let session = SandboxSession::new(Arc::new(ShellRuntime::new()), workspace.path(), config(captures.path()));

    let output = session
        .run_commands(
            &commands(&["echo A; echo B", "echo C && echo D", "false || echo E"]),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        output,
        "> echo A; echo B\nA\nB\n\n\n> echo C && echo D\nC\nD\n\n\n> false || echo E\nE\n\n\n"
    );
}

/// Test that a trailing comment does not swallow the end token
#[tokio::test]
async fn test_trailing_comment_completes() {
    let workspace = tempfile::tempdir().unwrap();
    let captures = tempfile::tempdir().unwrap();
    let mut cfg = config(captures.path());
    cfg.command_timeout = Some(Duration::from_secs(3));
    let session = SandboxSession::new(Arc::new(ShellRuntime::new()), workspace.path(), cfg);
    let cancel = CancellationToken::new();

    let output = session.run("echo hi  # greet", None, &cancel).await.unwrap();
    assert_eq!(output, "hi\n");

    // State set inside the group stays in the shell
    session.run("export COLOR=blue # remember", None, &cancel).await.unwrap();
    let output = session.run("echo $COLOR", None, &cancel).await.unwrap();
    assert_eq!(output, "blue\n");
}

/// Test that the container is created once and reused
#[tokio::test]
async fn test_ensure_session_reuses_container() {
    let workspace = tempfile::tempdir().unwrap();
    let runtime = Arc::new(ShellRuntime::new());
    let session = SandboxSession::new(runtime.clone(), workspace.path(), config(workspace.path()));

    let first = session.ensure_session().await.unwrap();
    let second = session.ensure_session().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.name, "sandpiper-sandbox");
    assert_eq!(runtime.count("build"), 1);
    assert_eq!(runtime.count("create"), 1);
    assert_eq!(runtime.count("start"), 1);
}

/// Test that a stopped container is removed and replaced
#[tokio::test]
async fn test_stopped_container_is_recreated() {
    let workspace = tempfile::tempdir().unwrap();
    let runtime = Arc::new(ShellRuntime::new().with_image("sandpiper-sandbox:latest"));
    let session = SandboxSession::new(runtime.clone(), workspace.path(), config(workspace.path()));

    let first = session.ensure_session().await.unwrap();
    runtime.kill("sandpiper-sandbox");
    let second = session.ensure_session().await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(runtime.count("build"), 0);
    assert_eq!(runtime.count("remove"), 1);
    assert_eq!(runtime.count("create"), 2);
}

/// Test that restart rebuilds the image and drops the container
#[tokio::test]
async fn test_restart_rebuilds_and_forgets_container() {
    let workspace = tempfile::tempdir().unwrap();
    let runtime = Arc::new(ShellRuntime::new());
    let session = SandboxSession::new(runtime.clone(), workspace.path(), config(workspace.path()));

    let before = session.ensure_session().await.unwrap();
    session.restart().await.unwrap();
    let after = session.ensure_session().await.unwrap();

    assert_ne!(before.id, after.id);
    assert_eq!(runtime.count("build"), 2);
    assert_eq!(runtime.count("stop"), 1);
    assert_eq!(runtime.count("create"), 2);
}

/// Test that an unreachable runtime is reported as unavailable
#[tokio::test]
async fn test_unavailable_runtime() {
    let workspace = tempfile::tempdir().unwrap();
    let session = SandboxSession::new(
        Arc::new(ShellRuntime::unavailable()),
        workspace.path(),
        config(workspace.path()),
    );
    let result = session
        .run_commands(&commands(&["true"]), None, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(SandboxError::Unavailable(_))));
}

/// Test that a long command hits the deadline
#[tokio::test]
async fn test_command_timeout() {
    let workspace = tempfile::tempdir().unwrap();
    let captures = tempfile::tempdir().unwrap();
    let mut cfg = config(captures.path());
    cfg.command_timeout = Some(Duration::from_millis(300));
    let session = SandboxSession::new(Arc::new(ShellRuntime::new()), workspace.path(), cfg);

    let result = session
        .run("sleep 5", None, &CancellationToken::new())
        .await;
    assert_eq!(result, Err(SandboxError::Timeout(Duration::from_millis(300))));
}

/// Test that cancellation interrupts polling
#[tokio::test]
async fn test_cancel_stops_polling() {
    let workspace = tempfile::tempdir().unwrap();
    let captures = tempfile::tempdir().unwrap();
    let mut cfg = config(captures.path());
    cfg.command_timeout = None;
    let session = SandboxSession::new(Arc::new(ShellRuntime::new()), workspace.path(), cfg);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let result = session.run("sleep 5", None, &cancel).await;
    assert_eq!(result, Err(SandboxError::Cancelled));
}

/// Test that partial output reaches the observer before the command ends
#[tokio::test]
async fn test_partial_output_is_streamed() {
    let workspace = tempfile::tempdir().unwrap();
    let captures = tempfile::tempdir().unwrap();
    let session = SandboxSession::new(Arc::new(ShellRuntime::new()), workspace.path(), config(captures.path()));

    let seen = Mutex::new(Vec::<String>::new());
    let stream = OutputStream::new("1700000000.1.2").observe(|text| {
        seen.lock().unwrap().push(text.to_string());
    });

    let output = session
        .run(
            "echo first; sleep 0.3; echo second",
            Some(&stream),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    drop(stream);

    assert_eq!(output, "first\nsecond\n");
    let seen = seen.into_inner().unwrap();
    assert!(seen.iter().any(|text| text == "first\n"), "partials: {:?}", seen);
}
