//! Asynchronous task tracking for root-query operations.

mod correlator;
mod model;
mod protocol;
mod reaper;
mod registry;

pub use correlator::ExecutionCorrelator;
pub use model::{Outcome, Task, TaskId, TaskStatus, TaskStatusView, ViewStatus, TIMEOUT_MARKER};
pub use protocol::{Notification, TaskTracker};
pub use reaper::{Reaper, ReaperHandle};
pub use registry::{TaskCell, TaskRegistry};
