//! Background scheduler for generation runs
//!
//! Every submitted run is tracked so the process can drain in-flight work on
//! shutdown. A semaphore caps how many provider calls run at once; runs over
//! the cap wait for a permit inside their own task, so submitting never blocks.

use crate::error::{Result, TaskError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Result of draining the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReport {
    /// Every tracked run finished
    Drained,
    /// The grace period ran out with runs still in flight
    TimedOut { remaining: usize },
}

#[derive(Clone)]
pub struct Scheduler {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
}

impl Scheduler {
    /// Create a scheduler running at most `max_concurrency` runs at once
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Start `fut` in the background. Fails once the scheduler is closed.
    pub fn spawn<F>(&self, fut: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(TaskError::SchedulerClosed);
        }

        let permits = Arc::clone(&self.permits);
        self.tracker.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Concurrency limiter closed: {}", e);
                    return;
                }
            };
            fut.await;
        });
        Ok(())
    }

    /// Whether new runs are refused
    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Stop accepting new runs. Runs already spawned keep going.
    pub fn close(&self) {
        self.tracker.close();
    }

    /// Runs spawned and not yet finished, including those waiting for a permit
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Close and wait up to `grace` for in-flight runs
    pub async fn shutdown(&self, grace: Duration) -> DrainReport {
        self.close();
        let remaining = self.in_flight();
        if remaining == 0 {
            return DrainReport::Drained;
        }

        info!("Waiting up to {:?} for {} generation(s)...", grace, remaining);
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                info!("All generations finished");
                DrainReport::Drained
            }
            Err(_) => {
                let remaining = self.in_flight();
                warn!("Drain timed out with {} generation(s) still running", remaining);
                DrainReport::TimedOut { remaining }
            }
        }
    }
}
