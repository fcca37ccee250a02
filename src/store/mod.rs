//! Task store abstraction
//!
//! The launcher, worker and poller only talk to a [`TaskStore`]. Production
//! uses [`PgTaskStore`] over the shared pool; tests use [`MemoryTaskStore`].

pub mod memory;
pub mod postgres;

use crate::db::models::{TaskKind, TaskOutcome, TaskRecord};
use crate::error::Result;
use async_trait::async_trait;

pub use memory::MemoryTaskStore;
pub use postgres::PgTaskStore;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a pending record and return it as stored.
    async fn insert_pending(&self, kind: TaskKind, task_id: &str) -> Result<TaskRecord>;

    /// Write a terminal outcome. Returns false when the task does not exist.
    async fn write_outcome(
        &self,
        kind: TaskKind,
        task_id: &str,
        outcome: &TaskOutcome,
    ) -> Result<bool>;

    /// Fetch the records for `task_ids`. Missing ids are absent from the result.
    async fn fetch_many(&self, kind: TaskKind, task_ids: &[String]) -> Result<Vec<TaskRecord>>;

    /// Set `overtime` + `message` on every still in-flight task in `task_ids`
    /// in a single write. Returns the number of rows changed.
    async fn mark_overtime(&self, kind: TaskKind, task_ids: &[String], message: &str)
        -> Result<u64>;
}
