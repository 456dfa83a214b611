//! Integration tests for the auto-repair loop.
//!
//! The executor and provider are scripted so every run is deterministic.

use std::sync::Arc;
use std::time::Duration;

use mend_chat::{
    build_repair_prompt, AttemptOutcome, AutoRepair, ContentStore, FsContentStore,
    MemoryContentStore, RepairConfig, RepairStatus, ScriptedProvider, ScriptedReply,
};
use mend_runner::{MockExecutor, MockResponse};

const FIX: &str = "EXPLANATION: The name was misspelled.\n\nFILE: app.py\n```python\nprint('fixed')\n```\n";

fn project() -> MemoryContentStore {
    MemoryContentStore::new()
        .with_root("/work")
        .with_file("demo", "app.py", "prnt('broken')")
        .with_file("demo", "requirements.txt", "")
}

fn repair(
    store: &MemoryContentStore,
    provider: &ScriptedProvider,
    executor: &MockExecutor,
) -> AutoRepair {
    AutoRepair::new(
        Arc::new(store.clone()),
        Arc::new(provider.clone()),
        Arc::new(executor.clone()),
    )
}

#[tokio::test]
async fn test_first_run_success_makes_no_provider_call() {
    let store = project();
    let provider = ScriptedProvider::new();
    let executor = MockExecutor::new().add_response(MockResponse::success("ok"));

    let report = repair(&store, &provider, &executor).run("demo", None).await;

    assert_eq!(report.status, RepairStatus::Success);
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.attempts[0].outcome, AttemptOutcome::Success);
    assert_eq!(provider.call_count(), 0);
    assert_eq!(report.final_output, "ok");
}

#[tokio::test]
async fn test_detected_command_and_timeout() {
    let store = project();
    let provider = ScriptedProvider::new();
    let executor = MockExecutor::new();

    let report = repair(&store, &provider, &executor).run("demo", None).await;

    assert_eq!(report.command.as_deref(), Some("python app.py"));
    let calls = executor.get_calls();
    assert_eq!(calls[0].command, "python app.py");
    assert_eq!(calls[0].timeout, Duration::from_secs(15));
    assert_eq!(calls[0].working_dir, std::path::PathBuf::from("/work/demo"));
}

#[tokio::test]
async fn test_fix_then_success() {
    let store = project();
    let provider = ScriptedProvider::new().add_reply(ScriptedReply::text(FIX));
    let executor = MockExecutor::new().with_responses(vec![
        MockResponse::failure(1, "NameError: name 'prnt' is not defined"),
        MockResponse::success("fixed"),
    ]);

    let report = repair(&store, &provider, &executor).run("demo", None).await;

    assert_eq!(report.status, RepairStatus::Success);
    let outcomes: Vec<AttemptOutcome> = report.attempts.iter().map(|a| a.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            AttemptOutcome::ErrorDetected,
            AttemptOutcome::FixApplied,
            AttemptOutcome::Success
        ]
    );
    assert!(report.attempts[1].applied_files.contains("app.py"));
    assert!(report.attempts[0].applied_files.is_empty());
    assert_eq!(store.file("demo", "app.py").as_deref(), Some("print('fixed')"));

    let prompt = &provider.prompts()[0];
    assert!(prompt.contains("NameError"));
    assert!(prompt.contains("prnt('broken')"));
}

#[tokio::test]
async fn test_no_fix_found_ends_exhausted() {
    let store = project();
    let provider = ScriptedProvider::new().add_reply(ScriptedReply::text("I'm not sure what is wrong."));
    let executor = MockExecutor::new().add_response(MockResponse::failure(1, "boom"));

    let report = repair(&store, &provider, &executor).run("demo", None).await;

    assert_eq!(report.status, RepairStatus::Exhausted);
    assert_eq!(
        report.attempts.last().map(|a| a.outcome),
        Some(AttemptOutcome::NoFixFound)
    );
    assert_eq!(executor.call_count(), 1);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_never_more_than_five_runs() {
    let store = project();
    let provider = ScriptedProvider::new().add_reply(ScriptedReply::text(FIX));
    let executor = MockExecutor::new().add_response(MockResponse::failure(1, "still broken"));

    let report = repair(&store, &provider, &executor).run("demo", None).await;

    assert_eq!(report.status, RepairStatus::Exhausted);
    assert_eq!(executor.call_count(), 5);
    assert_eq!(report.runs(), 5);
    assert_eq!(provider.call_count(), 4);
    assert_eq!(
        report.attempts.last().map(|a| a.outcome),
        Some(AttemptOutcome::ErrorDetected)
    );
    assert!(!report.attempts.is_empty());
}

#[tokio::test]
async fn test_timeout_counts_as_failed_run() {
    let store = project();
    let provider = ScriptedProvider::new().add_reply(ScriptedReply::text(FIX));
    let executor = MockExecutor::new().with_responses(vec![
        MockResponse::timeout("Traceback: stuck in retry loop"),
        MockResponse::success(""),
    ]);

    let report = repair(&store, &provider, &executor).run("demo", None).await;

    assert_eq!(report.status, RepairStatus::Success);
    let output = &report.attempts[0].command_output;
    assert!(output.contains("Traceback: stuck in retry loop"));
    assert!(output.contains("timed out after 15000ms"));
    assert!(provider.prompts()[0].contains("Traceback: stuck in retry loop"));
}

#[tokio::test]
async fn test_provider_failure_aborts_with_history() {
    let store = project();
    let provider = ScriptedProvider::new().add_reply(ScriptedReply::failure(503, "overloaded"));
    let executor = MockExecutor::new().add_response(MockResponse::failure(1, "boom"));

    let report = repair(&store, &provider, &executor).run("demo", None).await;

    assert_eq!(report.status, RepairStatus::Aborted);
    assert!(report.provider_failure);
    assert!(report.message.contains("503"));
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.attempts[0].outcome, AttemptOutcome::ErrorDetected);
}

#[tokio::test]
async fn test_unknown_project_type_is_abandoned() {
    let store = MemoryContentStore::new()
        .with_root("/work")
        .with_file("notes", "README.md", "# notes");
    let provider = ScriptedProvider::new();
    let executor = MockExecutor::new();

    let report = repair(&store, &provider, &executor).run("notes", None).await;

    assert_eq!(report.status, RepairStatus::Abandoned);
    assert!(!report.provider_failure);
    assert!(report.message.contains("specify"));
    assert_eq!(executor.call_count(), 0);

    let report = repair(&store, &provider, &executor)
        .run("notes", Some("cat README.md"))
        .await;
    assert_eq!(report.status, RepairStatus::Success);
    assert_eq!(executor.get_calls()[0].command, "cat README.md");
}

#[tokio::test]
async fn test_attempt_output_is_truncated() {
    let store = project();
    let provider = ScriptedProvider::new();
    let executor = MockExecutor::new().add_response(MockResponse::failure(1, "e".repeat(5000)));

    let report = repair(&store, &provider, &executor).run("demo", None).await;

    assert_eq!(report.attempts[0].command_output.chars().count(), 500);
    assert_eq!(report.final_output.len(), 5000);
}

#[test]
fn test_prompt_bounds_with_large_project() {
    let files: Vec<(String, String)> = (0..50)
        .map(|i| (format!("module_{:02}.py", i), "~".repeat(10_000)))
        .collect();

    let prompt = build_repair_prompt("python main.py", "Traceback", &files, &RepairConfig::default());

    assert_eq!(prompt.matches("\n### ").count(), 10);
    assert!(prompt.contains("module_09.py"));
    assert!(!prompt.contains("module_10.py"));
    assert_eq!(prompt.matches('~').count(), 10 * 3000);
    for block in prompt.split("\n### ").skip(1) {
        assert!(block.matches('~').count() <= 3000);
    }
}

#[tokio::test]
async fn test_gathered_context_is_bounded() {
    let mut store = MemoryContentStore::new().with_root("/work");
    for i in 0..50 {
        store = store.with_file("big", &format!("m{:02}.py", i), &"~".repeat(10_000));
    }
    let provider = ScriptedProvider::new().add_reply(ScriptedReply::text("no idea"));
    let executor = MockExecutor::new().add_response(MockResponse::failure(1, "error in m42.py"));

    repair(&store, &provider, &executor).run("big", None).await;

    let prompt = &provider.prompts()[0];
    assert_eq!(prompt.matches("\n### ").count(), 10);
    assert!(prompt.contains("### m42.py"));
    assert_eq!(prompt.matches('~').count(), 10 * 3000);
}

#[cfg(unix)]
#[tokio::test]
async fn test_real_process_repair_on_disk() {
    use mend_runner::{CommandRunner, ProcessRegistry, RunnerConfig};

    let temp = tempfile::tempdir().unwrap();
    let store = FsContentStore::new(temp.path());
    store.create_project("sh").unwrap();
    store
        .write_file("sh", "check.sh", "exit 1")
        .await
        .unwrap();

    let provider = ScriptedProvider::new().add_reply(ScriptedReply::text(
        "EXPLANATION: exit cleanly\nFILE: check.sh\n```sh\necho repaired\n```",
    ));
    let runner = CommandRunner::new(ProcessRegistry::new(), RunnerConfig::default());

    let report = AutoRepair::new(Arc::new(store.clone()), Arc::new(provider), Arc::new(runner))
        .with_config(RepairConfig::default().max_attempts(3))
        .run("sh", Some("sh check.sh"))
        .await;

    assert_eq!(report.status, RepairStatus::Success);
    assert_eq!(report.final_output.trim(), "repaired");
    assert_eq!(
        store.read_file("sh", "check.sh").await.unwrap(),
        "echo repaired"
    );
}
