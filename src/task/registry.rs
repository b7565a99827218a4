//! Keyed task store.
//!
//! The outer lock guards only membership: inserting a task with its
//! correlator entry, and looking up the per-task cell. Each task lives in its
//! own mutex, so status reads and writes for one task never contend with
//! another task.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::correlator::ExecutionCorrelator;
use super::model::{Task, TaskId};
use crate::engine::ExecutionId;
use crate::{Error, Result};

/// A task plus bookkeeping that is not part of the task record.
#[derive(Debug)]
pub struct TaskCell {
    pub task: Task,
    /// A client has read this task after it became terminal.
    pub observed: bool,
}

#[derive(Debug, Default)]
struct Tables {
    tasks: HashMap<TaskId, Arc<Mutex<TaskCell>>>,
    correlator: ExecutionCorrelator,
    /// Ids claimed by a trigger whose submission is still in flight.
    reserved: HashSet<TaskId>,
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    inner: RwLock<Tables>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id` before submitting its execution.
    ///
    /// # Errors
    ///
    /// `Error::TaskExists` if the id belongs to a task or is already claimed.
    pub async fn reserve(&self, id: &TaskId) -> Result<()> {
        let mut tables = self.inner.write().await;
        if tables.tasks.contains_key(id) || !tables.reserved.insert(id.clone()) {
            return Err(Error::TaskExists(id.clone()));
        }
        Ok(())
    }

    /// Give up a claim whose submission failed.
    pub async fn release(&self, id: &TaskId) {
        self.inner.write().await.reserved.remove(id);
    }

    /// Insert a task and its correlator entry together, consuming any claim
    /// on its id.
    ///
    /// # Errors
    ///
    /// `Error::TaskExists` if the id is taken; `Error::Engine` if the
    /// execution id is already correlated with another task. Nothing is
    /// inserted in either case.
    pub async fn create(&self, task: Task) -> Result<()> {
        let mut tables = self.inner.write().await;
        tables.reserved.remove(&task.id);
        if tables.tasks.contains_key(&task.id) {
            return Err(Error::TaskExists(task.id));
        }
        if tables.correlator.contains(&task.execution_id) {
            return Err(Error::Engine(format!(
                "execution {} is already correlated",
                task.execution_id
            )));
        }
        tables
            .correlator
            .insert(task.execution_id.clone(), task.id.clone());
        let id = task.id.clone();
        tables.tasks.insert(
            id,
            Arc::new(Mutex::new(TaskCell {
                task,
                observed: false,
            })),
        );
        Ok(())
    }

    pub async fn contains(&self, id: &TaskId) -> bool {
        self.inner.read().await.tasks.contains_key(id)
    }

    /// The lockable cell for one task.
    pub async fn cell(&self, id: &TaskId) -> Option<Arc<Mutex<TaskCell>>> {
        self.inner.read().await.tasks.get(id).cloned()
    }

    /// Snapshot of a task.
    pub async fn get(&self, id: &TaskId) -> Option<Task> {
        let cell = self.cell(id).await?;
        let guard = cell.lock().await;
        Some(guard.task.clone())
    }

    pub async fn task_for_execution(&self, execution: &ExecutionId) -> Option<TaskId> {
        self.inner
            .read()
            .await
            .correlator
            .task_for(execution)
            .cloned()
    }

    pub async fn ids(&self) -> Vec<TaskId> {
        self.inner.read().await.tasks.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.tasks.is_empty()
    }

    pub async fn correlated(&self) -> usize {
        self.inner.read().await.correlator.len()
    }

    /// Drop correlator entries whose task is terminal and has been read.
    /// Returns how many entries were removed.
    pub async fn collect_garbage(&self) -> usize {
        let cells: Vec<_> = self.inner.read().await.tasks.values().cloned().collect();

        let mut releasable = Vec::new();
        for cell in cells {
            let guard = cell.lock().await;
            if guard.observed && guard.task.is_finished() {
                releasable.push(guard.task.execution_id.clone());
            }
        }
        if releasable.is_empty() {
            return 0;
        }

        let mut tables = self.inner.write().await;
        let removed = releasable
            .iter()
            .filter(|execution| tables.correlator.remove(execution).is_some())
            .count();
        debug!(removed, "correlator entries released");
        removed
    }
}
