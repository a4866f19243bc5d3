//! Supersession Integration Tests
//!
//! Newer events in a concurrency group supersede older attempts, and
//! completion callbacks are idempotent.

use std::sync::Arc;

use serde_json::json;

use gantry::core::TransitionOutcome;
use gantry::{
    CoordinatorConfig, LoggingExecutor, RawEvent, RunOutcome, RunState, Scheduler,
};

fn pr_sync(number: u64, head: &str, merge_sha: &str) -> RawEvent {
    RawEvent {
        event: "pull_request".to_string(),
        action: Some("synchronize".to_string()),
        payload: json!({
            "number": number,
            "pull_request": {
                "number": number,
                "merge_commit_sha": merge_sha,
                "head": { "ref": head, "sha": "h".repeat(40) },
                "base": { "ref": "main", "sha": "b".repeat(40) },
            }
        }),
    }
}

fn pr_action(action: &str, number: u64, head: &str) -> RawEvent {
    RawEvent {
        event: "pull_request".to_string(),
        action: Some(action.to_string()),
        payload: json!({
            "number": number,
            "pull_request": {
                "number": number,
                "merge_commit_sha": "m".repeat(40),
                "head": { "ref": head, "sha": "h".repeat(40) },
                "base": { "ref": "main", "sha": "b".repeat(40) },
            }
        }),
    }
}

#[tokio::test]
async fn test_sequence_of_same_group_events_leaves_one_survivor() {
    // After five same-group admissions exactly one run (the last) is
    // non-terminal; all earlier ones are canceled.
    let scheduler = Scheduler::new(CoordinatorConfig::default(), Arc::new(LoggingExecutor));

    let mut outcomes = Vec::new();
    for i in 0..5 {
        let outcome = scheduler
            .submit(&pr_sync(3, "feature", &format!("{:040}", i)))
            .await
            .unwrap();
        outcomes.push(outcome);
    }

    let last = outcomes.last().unwrap();
    let key = &last.admitted.group_key;

    let active = scheduler.registry().list_active(key).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, last.admitted.id);

    let snapshot = scheduler.registry().snapshot().await;
    let (_, runs) = snapshot
        .iter()
        .find(|(k, _)| k == key)
        .expect("group present in snapshot");
    assert_eq!(runs.len(), 5);
    assert_eq!(
        runs.iter().filter(|r| r.state == RunState::Canceled).count(),
        4
    );
}

#[tokio::test]
async fn test_edited_pr_supersedes_opened_run_by_pr_number() {
    // Opened then edited for the same PR share a group when the
    // discriminant is the PR number; the opened run is canceled.
    let config = CoordinatorConfig::from_yaml(
        r#"
classes:
  pull_request_opened:
    discriminant: pull_request_number
    cancel_in_progress: true
  pull_request_edited:
    discriminant: pull_request_number
    cancel_in_progress: true
"#,
    )
    .unwrap();
    let scheduler = Scheduler::new(config, Arc::new(LoggingExecutor));

    let opened = scheduler
        .submit(&pr_action("opened", 2, "feature"))
        .await
        .unwrap();
    let edited = scheduler
        .submit(&pr_action("edited", 2, "feature"))
        .await
        .unwrap();

    assert_eq!(opened.admitted.group_key, edited.admitted.group_key);
    assert_eq!(edited.canceled.len(), 1);
    assert_eq!(edited.canceled[0].id, opened.admitted.id);

    let stored = scheduler.registry().get(opened.admitted.id).await.unwrap();
    assert_eq!(stored.state, RunState::Canceled);
    let stored = scheduler.registry().get(edited.admitted.id).await.unwrap();
    assert_eq!(stored.state, RunState::Queued);
}

#[tokio::test]
async fn test_duplicate_completion_is_a_noop() {
    // The second complete call reports AlreadyTerminal and the stored
    // state does not change.
    let scheduler = Scheduler::new(CoordinatorConfig::default(), Arc::new(LoggingExecutor));
    let outcome = scheduler
        .submit(&pr_sync(8, "feature", &"m".repeat(40)))
        .await
        .unwrap();
    let id = outcome.admitted.id;

    scheduler.mark_running(id).await.unwrap();
    assert_eq!(
        scheduler.complete(id, RunOutcome::Success).await.unwrap(),
        TransitionOutcome::Applied
    );
    assert_eq!(
        scheduler.complete(id, RunOutcome::Failure).await.unwrap(),
        TransitionOutcome::AlreadyTerminal
    );

    // First outcome wins
    let stored = scheduler.registry().get(id).await.unwrap();
    assert_eq!(stored.state, RunState::Completed);
}

#[tokio::test]
async fn test_cancel_races_completion_benignly() {
    // Cancellation is advisory: if the executor completes a run that the
    // engine canceled a moment earlier, the late callback is absorbed.
    let scheduler = Scheduler::new(CoordinatorConfig::default(), Arc::new(LoggingExecutor));

    let first = scheduler
        .submit(&pr_sync(4, "feature", &"a".repeat(40)))
        .await
        .unwrap();
    let second = scheduler
        .submit(&pr_sync(4, "feature", &"b".repeat(40)))
        .await
        .unwrap();
    assert_eq!(second.canceled.len(), 1);

    let late = scheduler
        .complete(first.admitted.id, RunOutcome::Success)
        .await
        .unwrap();
    assert_eq!(late, TransitionOutcome::AlreadyTerminal);

    let stored = scheduler.registry().get(first.admitted.id).await.unwrap();
    assert_eq!(stored.state, RunState::Canceled);
}
