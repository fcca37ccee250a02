//! Task launcher: records a pending task and starts its generation
//!
//! `submit` returns as soon as the pending record is durable. The run itself
//! happens on the [`Scheduler`], so the caller never waits on the provider.

use crate::db::models::TaskOutcome;
use crate::error::{Result, TaskError};
use crate::provider::GenerationRequest;
use crate::store::TaskStore;
use crate::worker::{GenerationWorker, Scheduler, GENERATION_FAILED_MESSAGE};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
pub struct TaskLauncher {
    store: Arc<dyn TaskStore>,
    worker: Arc<GenerationWorker>,
    scheduler: Scheduler,
}

impl TaskLauncher {
    pub fn new(store: Arc<dyn TaskStore>, worker: Arc<GenerationWorker>, scheduler: Scheduler) -> Self {
        Self {
            store,
            worker,
            scheduler,
        }
    }

    /// Create a pending task for `request`, schedule its run and return the
    /// new task id.
    ///
    /// Fails without creating anything when the scheduler is closed or the
    /// pending insert fails.
    pub async fn submit(&self, request: GenerationRequest) -> Result<String> {
        if self.scheduler.is_closed() {
            return Err(TaskError::SchedulerClosed);
        }

        let kind = request.kind();
        let task_id = uuid::Uuid::new_v4().to_string();
        self.store.insert_pending(kind, &task_id).await?;
        info!("Created {} task {}", kind, task_id);

        let worker = Arc::clone(&self.worker);
        let id = task_id.clone();
        let spawned = self.scheduler.spawn(async move {
            worker.run(&id, &request).await;
        });

        // Closed between the check and the spawn: the record exists, so it
        // must not be left pending forever.
        if let Err(e) = spawned {
            error!("Failed to schedule {} task {}: {}", kind, task_id, e);
            let outcome = TaskOutcome::Failed {
                message: GENERATION_FAILED_MESSAGE.to_string(),
            };
            if let Err(write_err) = self.store.write_outcome(kind, &task_id, &outcome).await {
                error!("Failed to mark task {} failed: {}", task_id, write_err);
            }
            return Err(e);
        }

        Ok(task_id)
    }
}
