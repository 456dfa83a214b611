//! Integration tests for command execution and process supervision.
//!
//! These tests spawn real shell processes and are limited to unix hosts.

#![cfg(unix)]

use std::time::Duration;

use mend_runner::{
    CommandExecutor, CommandOutcome, CommandRunner, PlatformShim, ProcessRegistry, RunnerConfig,
    RunnerError,
};

fn runner() -> CommandRunner {
    CommandRunner::new(ProcessRegistry::new(), RunnerConfig::new().settle_window(500))
}

/// Test a successful synchronous command.
#[tokio::test]
async fn test_run_captures_stdout() {
    let temp = tempfile::tempdir().unwrap();
    let result = runner()
        .run("echo hello", temp.path(), Duration::from_secs(5))
        .await
        .unwrap();

    assert!(!result.exit_failed);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.output().trim(), "hello");
}

/// Test that a non-zero exit is a result, not an error.
#[tokio::test]
async fn test_run_reports_failure_as_output() {
    let temp = tempfile::tempdir().unwrap();
    let result = runner()
        .run("echo broken >&2; exit 3", temp.path(), Duration::from_secs(5))
        .await
        .unwrap();

    assert!(result.exit_failed);
    assert_eq!(result.exit_code, Some(3));
    assert_eq!(result.output().trim(), "broken");
}

/// Test that the working directory is honoured.
#[tokio::test]
async fn test_run_in_working_directory() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(temp.path().join("marker.txt"), "present").unwrap();

    let result = runner()
        .run("cat marker.txt", temp.path(), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(result.stdout, "present");
}

/// Test the wall-clock timeout.
#[tokio::test]
async fn test_run_times_out() {
    let temp = tempfile::tempdir().unwrap();
    let result = runner()
        .run("sleep 10", temp.path(), Duration::from_millis(300))
        .await;

    assert!(matches!(result, Err(RunnerError::Timeout { millis: 300, .. })));
}

/// Test that output printed before a timeout is kept on the error.
#[tokio::test]
async fn test_timeout_keeps_partial_output() {
    let temp = tempfile::tempdir().unwrap();
    let err = runner()
        .run(
            "echo 'Traceback: partial'; sleep 10",
            temp.path(),
            Duration::from_millis(500),
        )
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Command timed out after 500ms");
    assert!(err.partial_output().unwrap_or_default().contains("Traceback: partial"));
}

/// Test that a detached grandchild holding the pipe does not erase output.
#[tokio::test]
async fn test_output_kept_when_pipe_outlives_process() {
    let temp = tempfile::tempdir().unwrap();
    let result = runner()
        .run(
            "echo visible-output; sleep 5 &",
            temp.path(),
            Duration::from_secs(10),
        )
        .await
        .unwrap();

    assert!(!result.exit_failed);
    assert_eq!(result.stdout.trim(), "visible-output");
}

/// Test that output beyond the cap is dropped, not buffered.
#[tokio::test]
async fn test_run_caps_output() {
    let temp = tempfile::tempdir().unwrap();
    let runner = CommandRunner::new(ProcessRegistry::new(), RunnerConfig::new().output_cap(16));

    let result = runner
        .run(
            "i=0; while [ $i -lt 200 ]; do echo line-$i; i=$((i+1)); done",
            temp.path(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(result.stdout.len(), 16);
    assert!(result.truncated);
}

/// Test the interpreter shim is applied before spawning.
#[tokio::test]
async fn test_shim_rewrites_python_invocation() {
    let temp = tempfile::tempdir().unwrap();
    let runner = runner().with_shim(PlatformShim::with_python("echo"));

    let result = runner
        .run("python app.py", temp.path(), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(result.stdout.trim(), "app.py");
}

/// Test a long-running command is detached, registered, and killable.
#[tokio::test]
async fn test_background_command_is_registered() {
    let temp = tempfile::tempdir().unwrap();
    let runner = runner();

    let launch = runner
        .spawn_background(
            "echo 'Server listening on port 4567'; sleep 30",
            temp.path(),
            "demo",
        )
        .await
        .unwrap();

    assert!(launch.ready);
    assert!(launch.running);
    assert_eq!(launch.port, Some(4567));
    assert!(launch.urls.contains(&"http://localhost:4567".to_string()));
    assert_eq!(runner.registry().get("demo").map(|p| p.pid), Some(launch.pid));

    runner.registry().kill(launch.pid).await.unwrap();
    assert!(runner.registry().find(launch.pid).is_none());
}

/// Test a server without a ready line falls back to the settle window.
#[tokio::test]
async fn test_background_without_ready_signal() {
    let temp = tempfile::tempdir().unwrap();
    let runner = runner();

    let launch = runner
        .spawn_background("sleep 30", temp.path(), "quiet")
        .await
        .unwrap();

    assert!(!launch.ready);
    assert!(launch.running);
    assert!(launch.banner.is_empty());

    runner.registry().kill(launch.pid).await.unwrap();
}

/// Test classification routes static servers to the background path.
#[tokio::test]
async fn test_execute_routes_by_classification() {
    let temp = tempfile::tempdir().unwrap();
    let runner = runner();

    let outcome = runner.execute("echo done", temp.path(), "p").await.unwrap();
    assert!(matches!(outcome, CommandOutcome::Completed(ref r) if r.stdout.trim() == "done"));
    assert!(runner.registry().is_empty());
}

/// Test killing a PID the registry does not know.
#[tokio::test]
async fn test_kill_unknown_pid() {
    let registry = ProcessRegistry::new();
    let result = registry.kill(999_999).await;

    assert!(matches!(result, Err(RunnerError::ProcessNotFound(999_999))));
    assert!(registry.is_empty());
}
