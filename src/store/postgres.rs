//! Postgres-backed task store

use super::TaskStore;
use crate::db::models::{TaskKind, TaskOutcome, TaskRecord};
use crate::db::{tasks, DbPool};
use crate::error::Result;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: DbPool,
}

impl PgTaskStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn insert_pending(&self, kind: TaskKind, task_id: &str) -> Result<TaskRecord> {
        tasks::insert_pending(&self.pool, kind, task_id).await
    }

    async fn write_outcome(
        &self,
        kind: TaskKind,
        task_id: &str,
        outcome: &TaskOutcome,
    ) -> Result<bool> {
        tasks::write_outcome(&self.pool, kind, task_id, outcome).await
    }

    async fn fetch_many(&self, kind: TaskKind, task_ids: &[String]) -> Result<Vec<TaskRecord>> {
        tasks::fetch_by_ids(&self.pool, kind, task_ids).await
    }

    async fn mark_overtime(
        &self,
        kind: TaskKind,
        task_ids: &[String],
        message: &str,
    ) -> Result<u64> {
        tasks::mark_overtime(&self.pool, kind, task_ids, message).await
    }
}
