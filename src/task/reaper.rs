//! Background sweep of expired tasks and stale correlator entries.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::protocol::TaskTracker;

/// Handle to a running reaper, used for graceful shutdown.
pub struct ReaperHandle {
    cancel: CancellationToken,
}

impl ReaperHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Signal the reaper to stop after its current sweep.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Periodically fails RUNNING tasks past their maximum age and releases
/// correlator entries of terminal tasks that have been read.
pub struct Reaper {
    tracker: Arc<TaskTracker>,
    interval: Duration,
}

impl Reaper {
    /// A reaper sweeping at the tracker's configured interval.
    pub fn new(tracker: Arc<TaskTracker>) -> Self {
        let interval = tracker.config().sweep_interval();
        Self { tracker, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn spawn(self) -> ReaperHandle {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        debug!(interval_ms = self.interval.as_millis() as u64, "Reaper::spawn");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);

            loop {
                tokio::select! {
                    _ = cancel_clone.cancelled() => {
                        debug!("reaper cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        let expired = self.tracker.sweep_expired().await;
                        let released = self.tracker.collect_garbage().await;
                        trace!(expired, released, "reaper sweep");
                    }
                }
            }
        });

        ReaperHandle::new(cancel)
    }
}
