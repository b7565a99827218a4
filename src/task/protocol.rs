//! Task triggering and status convergence.
//!
//! Completion of a task can be reported on two independent paths:
//!
//! - push: an inbound notification names an execution id and its state;
//! - poll: a client asks for a task by id and, if it is still RUNNING, the
//!   engine's live status is consulted.
//!
//! Both paths end in `TaskTracker::converge`, which holds the task's own lock
//! while it checks for RUNNING and writes the terminal state. Duplicate,
//! late or reordered reports therefore become no-ops, and a task with no
//! push delivery at all still converges through polling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::model::{Outcome, Task, TaskId, TaskStatusView, TIMEOUT_MARKER};
use super::registry::TaskRegistry;
use crate::compiler::{Args, CompiledSchema, Operation};
use crate::config::TaskConfig;
use crate::engine::{EngineStatus, ExecutionEngine, ExecutionId, Record};
use crate::util::with_timeout;
use crate::{Error, Result};

/// An inbound completion report from the engine's notification source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub execution_id: ExecutionId,
    pub status: EngineStatus,
}

impl Notification {
    pub fn new(execution_id: ExecutionId, status: EngineStatus) -> Self {
        Self {
            execution_id,
            status,
        }
    }

    /// Decode a transport payload of the form
    /// `{"executionId": "...", "state": "SUCCEEDED", "reason": "..."}`.
    pub fn from_json(payload: &str) -> Result<Self> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            execution_id: String,
            state: String,
            reason: Option<String>,
        }

        let raw: Raw = serde_json::from_str(payload)?;
        let status = EngineStatus::parse(&raw.state, raw.reason).ok_or_else(|| {
            Error::Validation(format!("unknown execution state '{}'", raw.state))
        })?;
        Ok(Self::new(ExecutionId(raw.execution_id), status))
    }
}

/// Tracks long-running root-query operations from trigger to terminal state.
pub struct TaskTracker {
    registry: TaskRegistry,
    engine: Arc<dyn ExecutionEngine>,
    config: TaskConfig,
    /// Declared fields of each task field's response type, for shaping.
    response_fields: HashMap<String, Vec<String>>,
}

impl TaskTracker {
    pub fn new(engine: Arc<dyn ExecutionEngine>, config: TaskConfig) -> Self {
        Self {
            registry: TaskRegistry::new(),
            engine,
            config,
            response_fields: HashMap::new(),
        }
    }

    /// Shape results of the schema's task operations to their declared
    /// response types.
    pub fn with_schema(mut self, schema: &CompiledSchema) -> Self {
        for op in schema.operations.tasks() {
            if let Some(ty) = schema
                .metadata
                .find_type(&op.response_type)
                .filter(|ty| !ty.primitive)
            {
                self.response_fields.insert(
                    op.field.clone(),
                    ty.fields.iter().map(|f| f.name.clone()).collect(),
                );
            }
        }
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Submit a root-query operation and record it as a RUNNING task.
    ///
    /// Never waits for completion.
    ///
    /// # Errors
    ///
    /// Compile-time errors from rendering the query, `Error::TaskExists` for
    /// a reused caller-supplied id, and `Error::Engine` or `Error::Timeout`
    /// from submission.
    pub async fn trigger(
        &self,
        op: &Operation,
        args: Args,
        task_id: Option<TaskId>,
    ) -> Result<Task> {
        if !op.task {
            return Err(Error::Validation(format!(
                "{}.{} is not a task operation",
                op.owner, op.field
            )));
        }
        let compiled = op.render(&args)?;

        let id = task_id.unwrap_or_default();
        self.registry.reserve(&id).await?;

        let execution_id =
            match with_timeout(self.config.engine_timeout(), self.engine.start(&compiled)).await {
                Ok(execution_id) => execution_id,
                Err(e) => {
                    self.registry.release(&id).await;
                    return Err(e);
                }
            };
        let task = Task::new(id, &op.field, args, execution_id);
        if let Err(e) = self.registry.create(task.clone()).await {
            warn!(task = %task.id, execution = %task.execution_id, error = %e, "submitted execution left untracked");
            return Err(e);
        }

        info!(task = %task.id, field = %task.field, execution = %task.execution_id, "task triggered");
        Ok(task)
    }

    /// Snapshot of a task without consulting the engine.
    pub async fn get(&self, id: &TaskId) -> Result<Task> {
        self.registry
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound(id.clone()))
    }

    /// Push path: apply one inbound notification.
    ///
    /// Returns `None` when the execution id is not correlated with any task.
    pub async fn push(&self, notification: Notification) -> Result<Option<Task>> {
        let Some(id) = self
            .registry
            .task_for_execution(&notification.execution_id)
            .await
        else {
            warn!(execution = %notification.execution_id, "notification for unknown execution skipped");
            return Ok(None);
        };
        debug!(task = %id, status = %notification.status, "push notification");
        self.converge(&id, notification.status).await.map(Some)
    }

    /// Apply a transport batch. Notifications are processed concurrently and
    /// results are returned in input order.
    pub async fn push_batch(&self, notifications: Vec<Notification>) -> Vec<Result<Option<Task>>> {
        join_all(notifications.into_iter().map(|n| self.push(n))).await
    }

    /// Poll path: one check of a task, returning the client status document.
    ///
    /// A RUNNING task is checked against the engine's live status. It is
    /// failed with a timeout marker only when it is past the configured
    /// maximum age and the engine still reports RUNNING or cannot be asked.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` for an unknown id. Engine errors while checking a
    /// RUNNING task within its maximum age are returned as is and leave the
    /// task unchanged.
    pub async fn poll(&self, id: &TaskId) -> Result<TaskStatusView> {
        let snapshot = self.get(id).await?;

        let task = if snapshot.is_finished() {
            snapshot
        } else {
            self.refresh(id, &snapshot).await?
        };

        if task.is_finished() {
            self.mark_observed(id).await;
        }
        Ok(task.view())
    }

    /// The shared transition for both paths.
    ///
    /// Applies `reported` only while the task is RUNNING; otherwise returns
    /// the task unchanged. A SUCCEEDED report fetches and shapes the result
    /// while the task is locked; if the fetch fails the task becomes FAILED.
    pub async fn converge(&self, id: &TaskId, reported: EngineStatus) -> Result<Task> {
        let cell = self
            .registry
            .cell(id)
            .await
            .ok_or_else(|| Error::NotFound(id.clone()))?;
        let mut cell = cell.lock().await;

        if cell.task.is_finished() {
            debug!(task = %id, status = %cell.task.status, reported = %reported, "already terminal, report ignored");
            return Ok(cell.task.clone());
        }

        let outcome = match reported {
            EngineStatus::Running => return Ok(cell.task.clone()),
            EngineStatus::Succeeded => match self.fetch_shaped(&cell.task).await {
                Ok(rows) => Outcome::Succeeded(rows),
                Err(e) => {
                    warn!(task = %id, error = %e, "result fetch failed");
                    Outcome::Failed(format!("result fetch failed: {}", e))
                }
            },
            EngineStatus::Failed { reason } => {
                Outcome::Failed(reason.unwrap_or_else(|| "execution failed".to_string()))
            }
            EngineStatus::Cancelled => Outcome::Cancelled,
        };

        cell.task.transition(outcome);
        info!(task = %id, status = %cell.task.status, "task finished");
        Ok(cell.task.clone())
    }

    /// Check every RUNNING task older than the maximum age against the
    /// engine. Tasks the engine reports terminal converge normally; the rest
    /// are failed with a timeout marker. Returns how many tasks were timed
    /// out by this call.
    pub async fn sweep_expired(&self) -> usize {
        if self.config.max_age().is_none() {
            return 0;
        }
        let mut expired = 0;
        for id in self.registry.ids().await {
            let Some(task) = self.registry.get(&id).await else {
                continue;
            };
            if task.is_finished() {
                continue;
            }
            if self.expired(&task).is_none() {
                continue;
            }
            if let Ok(after) = self.refresh(&id, &task).await {
                if after.timed_out() {
                    expired += 1;
                }
            }
        }
        if expired > 0 {
            info!(expired, "expired tasks failed");
        }
        expired
    }

    /// Release correlator entries of terminal tasks that were read.
    pub async fn collect_garbage(&self) -> usize {
        self.registry.collect_garbage().await
    }

    /// Consult the engine for a RUNNING task and converge on its answer.
    async fn refresh(&self, id: &TaskId, snapshot: &Task) -> Result<Task> {
        let live = with_timeout(
            self.config.engine_timeout(),
            self.engine.status(&snapshot.execution_id),
        )
        .await;
        match (live, self.expired(snapshot)) {
            (Ok(EngineStatus::Running), Some(max_age)) => self.expire(id, max_age).await,
            (Ok(status), _) => self.converge(id, status).await,
            (Err(e), Some(max_age)) => {
                warn!(task = %id, error = %e, "engine status unavailable past maximum age");
                self.expire(id, max_age).await
            }
            (Err(e), None) => Err(e),
        }
    }

    fn expired(&self, task: &Task) -> Option<Duration> {
        let max_age = self.config.max_age()?;
        (task.age(Utc::now()) >= max_age).then_some(max_age)
    }

    async fn expire(&self, id: &TaskId, max_age: Duration) -> Result<Task> {
        warn!(task = %id, max_age_secs = max_age.as_secs(), "task exceeded maximum age");
        self.converge(
            id,
            EngineStatus::Failed {
                reason: Some(format!(
                    "{}: no terminal status within {}s",
                    TIMEOUT_MARKER,
                    max_age.as_secs()
                )),
            },
        )
        .await
    }

    async fn mark_observed(&self, id: &TaskId) {
        if let Some(cell) = self.registry.cell(id).await {
            cell.lock().await.observed = true;
        }
    }

    async fn fetch_shaped(&self, task: &Task) -> Result<Vec<Record>> {
        let rows = with_timeout(
            self.config.engine_timeout(),
            self.engine.fetch_result(&task.execution_id),
        )
        .await?;
        Ok(match self.response_fields.get(&task.field) {
            Some(fields) => rows.into_iter().map(|row| shape(row, fields)).collect(),
            None => rows,
        })
    }
}

/// Keep the declared fields of a record; missing columns become null.
fn shape(mut row: Record, fields: &[String]) -> Record {
    fields
        .iter()
        .map(|name| {
            let value = row.remove(name).unwrap_or(serde_json::Value::Null);
            (name.clone(), value)
        })
        .collect()
}
