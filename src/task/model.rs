//! Task data model.
//!
//! A task is one tracked asynchronous execution of a root-query operation.
//! It is created RUNNING and moves to a terminal state exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::compiler::Args;
use crate::engine::{ExecutionId, Record};

/// Prefix of the failure detail recorded when a task exceeds its maximum age.
pub const TIMEOUT_MARKER: &str = "timeout";

/// Unique identifier for a task.
///
/// Callers may supply their own; otherwise a UUID v4 is generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Return the first 8 characters for display.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Task status in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Submitted to the engine, no terminal report yet.
    #[default]
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Running => write!(f, "RUNNING"),
            TaskStatus::Succeeded => write!(f, "SUCCEEDED"),
            TaskStatus::Failed => write!(f, "FAILED"),
            TaskStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A terminal outcome applied by `Task::transition`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Succeeded(Vec<Record>),
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Root-query field that triggered the task.
    pub field: String,
    /// Argument values as supplied at trigger time.
    pub arguments: Args,
    pub status: TaskStatus,
    pub execution_id: ExecutionId,
    pub started_at: DateTime<Utc>,
    /// Set exactly once, on the terminal transition.
    pub finished_at: Option<DateTime<Utc>>,
    /// Only ever populated in SUCCEEDED.
    pub result: Option<Vec<Record>>,
    pub error: Option<String>,
}

impl Task {
    /// Create a RUNNING task started now.
    pub fn new(id: TaskId, field: &str, arguments: Args, execution_id: ExecutionId) -> Self {
        Self {
            id,
            field: field.to_string(),
            arguments,
            status: TaskStatus::Running,
            execution_id,
            started_at: Utc::now(),
            finished_at: None,
            result: None,
            error: None,
        }
    }

    /// Apply a terminal outcome if, and only if, the task is still RUNNING.
    ///
    /// Returns whether the task changed. A terminal task is never modified.
    pub fn transition(&mut self, outcome: Outcome) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match outcome {
            Outcome::Succeeded(rows) => {
                self.status = TaskStatus::Succeeded;
                self.result = Some(rows);
            }
            Outcome::Failed(error) => {
                self.status = TaskStatus::Failed;
                self.error = Some(error);
            }
            Outcome::Cancelled => {
                self.status = TaskStatus::Cancelled;
            }
        }
        self.finished_at = Some(Utc::now());
        true
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Time since the task started, as of `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn timed_out(&self) -> bool {
        self.status == TaskStatus::Failed
            && self
                .error
                .as_deref()
                .is_some_and(|e| e.starts_with(TIMEOUT_MARKER))
    }

    /// The status document returned to a polling client.
    pub fn view(&self) -> TaskStatusView {
        let (status, error) = match self.status {
            TaskStatus::Running => (ViewStatus::Running, None),
            TaskStatus::Succeeded => (ViewStatus::Succeeded, None),
            TaskStatus::Failed => (ViewStatus::Failed, self.error.clone()),
            TaskStatus::Cancelled => (
                ViewStatus::Failed,
                Some(self.error.clone().unwrap_or_else(|| "cancelled".to_string())),
            ),
        };
        TaskStatusView {
            status,
            result: match self.status {
                TaskStatus::Succeeded => self.result.clone(),
                _ => None,
            },
            started_at: self.started_at,
            finished_at: self.finished_at,
            error,
        }
    }
}

/// Externally visible task status. Cancellation is reported as FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusView {
    pub status: ViewStatus,
    pub result: Option<Vec<Record>>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
