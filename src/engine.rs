//! The external query execution engine.
//!
//! `sqlgate` never runs queries itself. It hands compiled queries to an
//! `ExecutionEngine`, correlates the returned execution id with a task, and
//! later asks the engine for status and results.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::compiler::CompiledQuery;
use crate::{Error, Result};

/// A single result record, column name to value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Identifier the engine assigns to one query execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(pub String);

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExecutionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ExecutionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Execution state as the engine reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum EngineStatus {
    Running,
    Succeeded,
    Failed { reason: Option<String> },
    Cancelled,
}

impl EngineStatus {
    /// Map an engine-native state name. Queued and submitted executions
    /// count as running.
    pub fn parse(state: &str, reason: Option<String>) -> Option<Self> {
        match state.to_ascii_uppercase().as_str() {
            "QUEUED" | "SUBMITTED" | "PENDING" | "RUNNING" => Some(Self::Running),
            "SUCCEEDED" | "SUCCESS" | "COMPLETED" => Some(Self::Succeeded),
            "FAILED" | "ERROR" => Some(Self::Failed { reason }),
            "CANCELLED" | "CANCELED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, EngineStatus::Running)
    }
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineStatus::Running => write!(f, "running"),
            EngineStatus::Succeeded => write!(f, "succeeded"),
            EngineStatus::Failed { reason: Some(r) } => write!(f, "failed: {}", r),
            EngineStatus::Failed { reason: None } => write!(f, "failed"),
            EngineStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Submit a query and return without waiting for completion.
    async fn start(&self, query: &CompiledQuery) -> Result<ExecutionId>;

    /// Current state of an execution.
    async fn status(&self, execution: &ExecutionId) -> Result<EngineStatus>;

    /// Result rows of a succeeded execution.
    async fn fetch_result(&self, execution: &ExecutionId) -> Result<Vec<Record>>;
}

#[derive(Debug, Clone)]
struct MemoryExecution {
    query: String,
    status: EngineStatus,
    rows: Vec<Record>,
    fetch_error: Option<String>,
}

/// In-memory engine whose executions are completed by hand.
///
/// Useful for tests and local development: `start` records the query and
/// leaves the execution running until `complete`, `fail` or `cancel` is
/// called.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    executions: Mutex<HashMap<ExecutionId, MemoryExecution>>,
    next_id: AtomicU64,
    fetches: AtomicUsize,
    reject_starts: Mutex<Option<String>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn executions(&self) -> MutexGuard<'_, HashMap<ExecutionId, MemoryExecution>> {
        self.executions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, id: &ExecutionId, f: impl FnOnce(&mut MemoryExecution)) -> bool {
        match self.executions().get_mut(id) {
            Some(exec) => {
                f(exec);
                true
            }
            None => false,
        }
    }

    /// Mark an execution succeeded with the given rows.
    pub fn complete(&self, id: &ExecutionId, rows: Vec<Record>) -> bool {
        self.update(id, |exec| {
            exec.status = EngineStatus::Succeeded;
            exec.rows = rows;
        })
    }

    pub fn fail(&self, id: &ExecutionId, reason: &str) -> bool {
        self.update(id, |exec| {
            exec.status = EngineStatus::Failed {
                reason: Some(reason.to_string()),
            }
        })
    }

    pub fn cancel(&self, id: &ExecutionId) -> bool {
        self.update(id, |exec| exec.status = EngineStatus::Cancelled)
    }

    /// Make `fetch_result` fail for this execution.
    pub fn break_result(&self, id: &ExecutionId, message: &str) -> bool {
        self.update(id, |exec| exec.fetch_error = Some(message.to_string()))
    }

    /// Make every following `start` fail with `reason`; `None` restores.
    pub fn reject_starts(&self, reason: Option<&str>) {
        *self
            .reject_starts
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = reason.map(str::to_string);
    }

    pub fn query(&self, id: &ExecutionId) -> Option<String> {
        self.executions().get(id).map(|exec| exec.query.clone())
    }

    /// Number of executions started so far.
    pub fn started(&self) -> usize {
        self.executions().len()
    }

    /// Number of `fetch_result` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionEngine for MemoryEngine {
    async fn start(&self, query: &CompiledQuery) -> Result<ExecutionId> {
        if let Some(reason) = self
            .reject_starts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(Error::Engine(reason));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = ExecutionId(format!("exec-{:04}", n));
        self.executions().insert(
            id.clone(),
            MemoryExecution {
                query: query.query.clone(),
                status: EngineStatus::Running,
                rows: Vec::new(),
                fetch_error: None,
            },
        );
        Ok(id)
    }

    async fn status(&self, execution: &ExecutionId) -> Result<EngineStatus> {
        self.executions()
            .get(execution)
            .map(|exec| exec.status.clone())
            .ok_or_else(|| Error::Engine(format!("unknown execution {}", execution)))
    }

    async fn fetch_result(&self, execution: &ExecutionId) -> Result<Vec<Record>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let executions = self.executions();
        let exec = executions
            .get(execution)
            .ok_or_else(|| Error::Engine(format!("unknown execution {}", execution)))?;
        if let Some(message) = &exec.fetch_error {
            return Err(Error::Engine(message.clone()));
        }
        if exec.status != EngineStatus::Succeeded {
            return Err(Error::Engine(format!(
                "execution {} has no result ({})",
                execution, exec.status
            )));
        }
        Ok(exec.rows.clone())
    }
}
