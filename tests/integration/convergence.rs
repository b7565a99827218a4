//! Push and poll convergence integration tests.
//!
//! These tests verify that completion reported through either path, in any
//! order and any number of times, settles a task exactly once.

use serde_json::json;

use sqlgate::task::ViewStatus;
use sqlgate::{EngineStatus, Error, ExecutionId, Notification, TaskId, TaskStatus};

use crate::fixtures::{args, book_rows, row, TestTracker};

/// Test: Poll lifecycle
/// Given a freshly triggered task
/// When polled before and after the engine succeeds
/// Then the status document moves from RUNNING to SUCCEEDED with a result
#[tokio::test]
async fn test_poll_lifecycle() {
    let t = TestTracker::new();
    let task = t.trigger_books().await;
    assert_eq!(
        t.engine.query(&task.execution_id).as_deref(),
        Some("SELECT * FROM book WHERE author = 'Ursula K. Le Guin' AND year >= 1970")
    );

    let view = serde_json::to_value(t.tracker.poll(&task.id).await.unwrap()).unwrap();
    assert_eq!(view["status"], "RUNNING");
    assert!(view["result"].is_null());
    assert!(view["finishedAt"].is_null());
    assert!(view["startedAt"].is_string());

    t.engine.complete(&task.execution_id, book_rows());

    let view = serde_json::to_value(t.tracker.poll(&task.id).await.unwrap()).unwrap();
    assert_eq!(view["status"], "SUCCEEDED");
    assert!(view["finishedAt"].is_string());
    let result = view["result"].as_array().unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result[0]["title"], "The Dispossessed");
    // Shaped to Book: columns the type does not declare are dropped.
    assert!(result[0].get("year").is_none());
    // Declared fields missing from the row are null.
    assert!(result[0]["genres"].is_null());
}

/// Test: Push lifecycle
/// Given a triggered task
/// When the engine pushes SUCCEEDED
/// Then a later poll returns the pushed result without asking the engine
#[tokio::test]
async fn test_push_then_poll() {
    let t = TestTracker::new();
    let task = t.trigger_books().await;
    t.engine.complete(&task.execution_id, book_rows());

    let pushed = t
        .tracker
        .push(Notification::new(task.execution_id.clone(), EngineStatus::Succeeded))
        .await
        .unwrap()
        .expect("execution is correlated");
    assert_eq!(pushed.status, TaskStatus::Succeeded);

    // Even if the engine later forgets the execution, the task stays settled.
    t.engine.fail(&task.execution_id, "history purged");
    let view = t.tracker.poll(&task.id).await.unwrap();
    assert_eq!(view.status, ViewStatus::Succeeded);
    assert_eq!(view.finished_at, pushed.finished_at);
    assert_eq!(view.result.unwrap().len(), 2);
    assert_eq!(t.engine.fetch_count(), 1);
}

/// Test: Push after poll
/// Given a task already resolved by polling
/// When a late or duplicated push arrives with a different status
/// Then the task is unchanged
#[tokio::test]
async fn test_push_after_poll_is_no_op() {
    let t = TestTracker::new();
    let task = t.trigger_books().await;
    t.engine.complete(&task.execution_id, book_rows());
    t.tracker.poll(&task.id).await.unwrap();
    let settled = t.tracker.get(&task.id).await.unwrap();

    for status in [
        EngineStatus::Succeeded,
        EngineStatus::Failed {
            reason: Some("late".to_string()),
        },
        EngineStatus::Cancelled,
        EngineStatus::Running,
    ] {
        let after = t
            .tracker
            .push(Notification::new(task.execution_id.clone(), status))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after, settled);
    }
    assert_eq!(
        serde_json::to_vec(&t.tracker.get(&task.id).await.unwrap()).unwrap(),
        serde_json::to_vec(&settled).unwrap()
    );
}

/// Test: Pure polling
/// Given no push delivery ever happens
/// When the caller keeps polling
/// Then the task still converges
#[tokio::test]
async fn test_polling_alone_converges() {
    let t = TestTracker::new();
    let task = t
        .trigger("search", args(&[("q", "dragon".into())]))
        .await;

    for _ in 0..3 {
        assert_eq!(t.tracker.poll(&task.id).await.unwrap().status, ViewStatus::Running);
    }
    t.engine.fail(&task.execution_id, "table book does not exist");

    let view = t.tracker.poll(&task.id).await.unwrap();
    assert_eq!(view.status, ViewStatus::Failed);
    assert_eq!(view.error.as_deref(), Some("table book does not exist"));
    assert!(view.result.is_none());
}

/// Test: Task response shaping
/// Given a task whose response type is a `@task_response` type
/// When it succeeds
/// Then rows are projected onto that type
#[tokio::test]
async fn test_task_response_shaping() {
    let t = TestTracker::new();
    let task = t
        .trigger("genreReport", args(&[("genre", "Fantasy".into())]))
        .await;
    assert!(t
        .engine
        .query(&task.execution_id)
        .unwrap()
        .contains("JOIN lnk_book_genres bg ON bg.book_id = b.id"));

    t.engine.complete(
        &task.execution_id,
        vec![row(json!({"total": 12, "genre": "Fantasy", "_rank": 1}))],
    );
    let view = t.tracker.poll(&task.id).await.unwrap();
    let result = view.result.unwrap();
    assert_eq!(result[0].len(), 2);
    assert_eq!(result[0]["total"], 12);
}

#[tokio::test]
async fn test_result_fetch_failure_is_terminal_failed() {
    let t = TestTracker::new();
    let task = t.trigger_books().await;
    t.engine.complete(&task.execution_id, book_rows());
    t.engine.break_result(&task.execution_id, "result location unreadable");

    let pushed = t
        .tracker
        .push(Notification::new(task.execution_id.clone(), EngineStatus::Succeeded))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pushed.status, TaskStatus::Failed);
    assert!(pushed.result.is_none());
    assert!(pushed
        .error
        .as_deref()
        .unwrap()
        .starts_with("result fetch failed"));

    // Never reverts to RUNNING, and never retries the fetch.
    let view = t.tracker.poll(&task.id).await.unwrap();
    assert_eq!(view.status, ViewStatus::Failed);
    assert_eq!(t.engine.fetch_count(), 1);
}

#[tokio::test]
async fn test_cancellation_reported_as_failed() {
    let t = TestTracker::new();
    let task = t.trigger_books().await;
    t.engine.cancel(&task.execution_id);

    let view = serde_json::to_value(t.tracker.poll(&task.id).await.unwrap()).unwrap();
    assert_eq!(view["status"], "FAILED");
    assert_eq!(view["error"], "cancelled");
    assert_eq!(
        t.tracker.get(&task.id).await.unwrap().status,
        TaskStatus::Cancelled
    );
}

/// Test: Unknown ids
/// Given a task id that was never triggered
/// When polled
/// Then NotFound is returned, never a FAILED status
#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let t = TestTracker::new();
    let err = t.tracker.poll(&TaskId::from("never-triggered")).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(ref id) if id.0 == "never-triggered"));
}

#[tokio::test]
async fn test_foreign_notification_skipped() {
    let t = TestTracker::new();
    let op = t.schema.operations.query("books").unwrap();
    let task = t
        .tracker
        .trigger(op, args(&[("author", "x".into())]), Some(TaskId::from("manual-1")))
        .await
        .unwrap();

    let skipped = t
        .tracker
        .push(Notification::new(ExecutionId::from("elsewhere-9"), EngineStatus::Succeeded))
        .await
        .unwrap();
    assert!(skipped.is_none());
    assert_eq!(t.tracker.poll(&task.id).await.unwrap().status, ViewStatus::Running);
}

/// Test: Batch push
/// Given a transport batch with duplicates and a foreign execution id
/// When the batch is pushed
/// Then each notification is reported in order and each task settles once
#[tokio::test]
async fn test_push_batch() {
    let t = TestTracker::new();
    let a = t.trigger_books().await;
    let b = t.trigger("search", args(&[("q", "sea".into())])).await;
    t.engine.complete(&a.execution_id, book_rows());
    t.engine.fail(&b.execution_id, "quota exceeded");

    let results = t
        .tracker
        .push_batch(vec![
            Notification::new(a.execution_id.clone(), EngineStatus::Succeeded),
            Notification::from_json(&format!(
                r#"{{"executionId": "{}", "state": "FAILED", "reason": "quota exceeded"}}"#,
                b.execution_id
            ))
            .unwrap(),
            Notification::new(ExecutionId::from("foreign"), EngineStatus::Succeeded),
            Notification::new(a.execution_id.clone(), EngineStatus::Succeeded),
        ])
        .await;

    assert_eq!(results.len(), 4);
    let statuses: Vec<_> = results
        .iter()
        .map(|r| r.as_ref().unwrap().as_ref().map(|task| task.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            Some(TaskStatus::Succeeded),
            Some(TaskStatus::Failed),
            None,
            Some(TaskStatus::Succeeded),
        ]
    );
    assert_eq!(t.engine.fetch_count(), 1);
    assert_eq!(
        t.tracker.get(&b.id).await.unwrap().error.as_deref(),
        Some("quota exceeded")
    );
}

#[tokio::test]
async fn test_trigger_with_existing_id_rejected() {
    let t = TestTracker::new();
    let op = t.schema.operations.query("search").unwrap();
    let id = TaskId::from("weekly");
    t.tracker
        .trigger(op, args(&[("q", "a".into())]), Some(id.clone()))
        .await
        .unwrap();
    let err = t
        .tracker
        .trigger(op, args(&[("q", "b".into())]), Some(id))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TaskExists(_)));
    assert_eq!(t.tracker.registry().len().await, 1);
}

#[tokio::test]
async fn test_mutation_cannot_be_triggered() {
    let t = TestTracker::new();
    let op = t.schema.operations.mutation("removeBook").unwrap();
    let err = t
        .tracker
        .trigger(op, args(&[("id", "1".into())]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}
