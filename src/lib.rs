pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod schema;
pub mod task;
pub mod util;

pub use compiler::{ArgValue, Args, CompiledQuery, CompiledSchema, Operation, QueryKind};
pub use engine::{EngineStatus, ExecutionEngine, ExecutionId, MemoryEngine, Record};
pub use error::{Error, Result};
pub use task::{Notification, Task, TaskId, TaskStatus, TaskStatusView, TaskTracker};
