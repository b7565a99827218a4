//! Racing push and poll reports against the same task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use sqlgate::compiler::CompiledQuery;
use sqlgate::config::TaskConfig;
use sqlgate::task::ViewStatus;
use sqlgate::{
    EngineStatus, Error, ExecutionEngine, ExecutionId, MemoryEngine, Notification, Record,
    Result, TaskId, TaskStatus, TaskTracker,
};

use crate::fixtures::{args, book_rows, schema, TestTracker};

/// Wraps a `MemoryEngine` with a switchable status outage and a delay on
/// result fetches.
struct UnsteadyEngine {
    inner: Arc<MemoryEngine>,
    status_down: AtomicBool,
    fetch_delay: Duration,
}

#[async_trait]
impl ExecutionEngine for UnsteadyEngine {
    async fn start(&self, query: &CompiledQuery) -> Result<ExecutionId> {
        self.inner.start(query).await
    }

    async fn status(&self, execution: &ExecutionId) -> Result<EngineStatus> {
        if self.status_down.load(Ordering::SeqCst) {
            return Err(Error::Engine("status endpoint unavailable".to_string()));
        }
        self.inner.status(execution).await
    }

    async fn fetch_result(&self, execution: &ExecutionId) -> Result<Vec<Record>> {
        tokio::time::sleep(self.fetch_delay).await;
        self.inner.fetch_result(execution).await
    }
}

fn unsteady(
    fetch_delay: Duration,
    config: TaskConfig,
) -> (Arc<MemoryEngine>, Arc<UnsteadyEngine>, Arc<TaskTracker>) {
    let memory = Arc::new(MemoryEngine::new());
    let engine = Arc::new(UnsteadyEngine {
        inner: memory.clone(),
        status_down: AtomicBool::new(false),
        fetch_delay,
    });
    let tracker = Arc::new(TaskTracker::new(engine.clone(), config).with_schema(&schema()));
    (memory, engine, tracker)
}

/// Test: Concurrent push and poll
/// Given a RUNNING task whose execution has succeeded
/// When many pushes and polls race against it
/// Then exactly one terminal write happens and every caller sees it
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_push_and_poll_write_once() {
    let t = TestTracker::new();
    let task = t.trigger_books().await;
    t.engine.complete(&task.execution_id, book_rows());

    let mut handles = Vec::new();
    for i in 0..32 {
        let tracker = Arc::clone(&t.tracker);
        let id = task.id.clone();
        let execution = task.execution_id.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                tracker
                    .push(Notification::new(execution, EngineStatus::Succeeded))
                    .await
                    .unwrap()
                    .unwrap()
                    .finished_at
            } else {
                let view = tracker.poll(&id).await.unwrap();
                assert_eq!(view.status, ViewStatus::Succeeded);
                view.finished_at
            }
        }));
    }

    let mut finished = Vec::new();
    for handle in handles {
        finished.push(handle.await.unwrap());
    }

    let settled = t.tracker.get(&task.id).await.unwrap();
    assert_eq!(settled.status, TaskStatus::Succeeded);
    assert!(finished.iter().all(|f| *f == settled.finished_at));
    assert_eq!(t.engine.fetch_count(), 1);
}

/// Test: Conflicting reports
/// Given a push claiming FAILED and an engine reporting SUCCEEDED
/// When they race
/// Then one wins and every observer agrees on it
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_conflicting_reports_agree() {
    let (memory, _engine, tracker) = unsteady(Duration::from_millis(20), TaskConfig::default());
    let schema = schema();
    let op = schema.operations.query("search").unwrap();
    let task = tracker.trigger(op, args(&[("q", "x".into())]), None).await.unwrap();
    memory.complete(&task.execution_id, book_rows());

    let poller = {
        let tracker = Arc::clone(&tracker);
        let id = task.id.clone();
        tokio::spawn(async move { tracker.poll(&id).await.unwrap() })
    };
    let pusher = {
        let tracker = Arc::clone(&tracker);
        let execution = task.execution_id.clone();
        tokio::spawn(async move {
            tracker
                .push(Notification::new(
                    execution,
                    EngineStatus::Failed {
                        reason: Some("worker lost".to_string()),
                    },
                ))
                .await
                .unwrap()
                .unwrap()
        })
    };

    let polled = poller.await.unwrap();
    let pushed = pusher.await.unwrap();
    let settled = tracker.get(&task.id).await.unwrap();

    assert!(settled.status.is_terminal());
    assert_eq!(pushed, settled);
    assert_eq!(polled, settled.view());
}

#[tokio::test]
async fn test_engine_error_while_polling_leaves_task_running() {
    let (memory, engine, tracker) = unsteady(Duration::ZERO, TaskConfig::default());
    let schema = schema();
    let op = schema.operations.query("search").unwrap();
    let task = tracker.trigger(op, args(&[("q", "x".into())]), None).await.unwrap();
    memory.complete(&task.execution_id, book_rows());

    engine.status_down.store(true, Ordering::SeqCst);
    let err = tracker.poll(&task.id).await.unwrap_err();
    assert!(matches!(err, Error::Engine(_)));
    assert_eq!(tracker.get(&task.id).await.unwrap().status, TaskStatus::Running);

    engine.status_down.store(false, Ordering::SeqCst);
    assert_eq!(tracker.poll(&task.id).await.unwrap().status, ViewStatus::Succeeded);
}

#[tokio::test]
async fn test_unreachable_engine_past_max_age_times_out() {
    let (_memory, engine, tracker) = unsteady(
        Duration::ZERO,
        TaskConfig {
            max_age_secs: Some(0),
            ..Default::default()
        },
    );
    let schema = schema();
    let op = schema.operations.query("search").unwrap();
    let task = tracker.trigger(op, args(&[("q", "x".into())]), None).await.unwrap();

    engine.status_down.store(true, Ordering::SeqCst);
    let view = tracker.poll(&task.id).await.unwrap();
    assert_eq!(view.status, ViewStatus::Failed);
    assert!(tracker.get(&task.id).await.unwrap().timed_out());
}

/// Test: Concurrent triggers sharing a caller-supplied id
/// Given many triggers racing with the same task id
/// When they all submit
/// Then exactly one execution is started and tracked
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_triggers_with_same_id() {
    let t = TestTracker::new();
    let op = t.schema.operations.query("search").unwrap().clone();
    let mut handles = Vec::new();
    for _ in 0..16 {
        let tracker = Arc::clone(&t.tracker);
        let op = op.clone();
        handles.push(tokio::spawn(async move {
            tracker
                .trigger(&op, args(&[("q", "x".into())]), Some(TaskId::from("shared")))
                .await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) => assert!(matches!(e, Error::TaskExists(_))),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(t.engine.started(), 1);
    assert_eq!(t.tracker.registry().correlated().await, 1);
}

#[tokio::test]
async fn test_slow_result_fetch_times_out_to_failed() {
    let (memory, _engine, tracker) = unsteady(
        Duration::from_secs(3),
        TaskConfig {
            engine_timeout_secs: 1,
            ..Default::default()
        },
    );
    let schema = schema();
    let op = schema.operations.query("search").unwrap();
    let task = tracker.trigger(op, args(&[("q", "x".into())]), None).await.unwrap();
    memory.complete(&task.execution_id, book_rows());

    let pushed = tracker
        .push(Notification::new(task.execution_id.clone(), EngineStatus::Succeeded))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pushed.status, TaskStatus::Failed);
    assert!(pushed.error.unwrap().starts_with("result fetch failed"));
}
