//! Execution id to task id correlation.

use std::collections::HashMap;

use super::model::TaskId;
use crate::engine::ExecutionId;

/// Maps an engine execution id to the task it belongs to.
///
/// Entries are written once alongside their task and never updated; they
/// may only be removed.
#[derive(Debug, Default)]
pub struct ExecutionCorrelator {
    entries: HashMap<ExecutionId, TaskId>,
}

impl ExecutionCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `execution -> task`. Returns false, leaving the existing entry
    /// untouched, if the execution is already correlated.
    pub fn insert(&mut self, execution: ExecutionId, task: TaskId) -> bool {
        if self.entries.contains_key(&execution) {
            return false;
        }
        self.entries.insert(execution, task);
        true
    }

    pub fn contains(&self, execution: &ExecutionId) -> bool {
        self.entries.contains_key(execution)
    }

    pub fn task_for(&self, execution: &ExecutionId) -> Option<&TaskId> {
        self.entries.get(execution)
    }

    pub fn remove(&mut self, execution: &ExecutionId) -> Option<TaskId> {
        self.entries.remove(execution)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
