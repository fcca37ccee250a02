//! In-process task store
//!
//! Same semantics as the Postgres store. Locks are only held for the map
//! operation itself, never across an await.

use super::TaskStore;
use crate::db::models::{TaskKind, TaskOutcome, TaskRecord, TaskStatus};
use crate::error::{Result, TaskError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

type Key = (TaskKind, String);

#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<Key, TaskRecord>>,
    reads: AtomicUsize,
    overtime_writes: AtomicUsize,
    fail_overtime_writes: AtomicBool,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a single record
    pub fn get(&self, kind: TaskKind, task_id: &str) -> Option<TaskRecord> {
        let map = self.tasks.read().ok()?;
        map.get(&(kind, task_id.to_string())).cloned()
    }

    /// Move a record's creation time, e.g. to age it past a threshold
    pub fn set_created_at(&self, kind: TaskKind, task_id: &str, created_at: DateTime<Utc>) -> bool {
        match self.tasks.write() {
            Ok(mut map) => match map.get_mut(&(kind, task_id.to_string())) {
                Some(task) => {
                    task.created_at = created_at;
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Number of `fetch_many` calls served
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `mark_overtime` calls received
    pub fn overtime_write_count(&self) -> usize {
        self.overtime_writes.load(Ordering::SeqCst)
    }

    /// Make subsequent `mark_overtime` calls fail
    pub fn fail_overtime_writes(&self, fail: bool) {
        self.fail_overtime_writes.store(fail, Ordering::SeqCst);
    }

    fn lock_error() -> TaskError {
        TaskError::Store(sqlx::Error::Protocol("task map lock poisoned".to_string()))
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert_pending(&self, kind: TaskKind, task_id: &str) -> Result<TaskRecord> {
        let mut map = self.tasks.write().map_err(|_| Self::lock_error())?;
        let key = (kind, task_id.to_string());
        if map.contains_key(&key) {
            return Err(TaskError::Store(sqlx::Error::Protocol(format!(
                "duplicate task_id {} in {}",
                task_id,
                kind.table()
            ))));
        }
        let record = TaskRecord::pending(task_id, Utc::now());
        map.insert(key, record.clone());
        Ok(record)
    }

    async fn write_outcome(
        &self,
        kind: TaskKind,
        task_id: &str,
        outcome: &TaskOutcome,
    ) -> Result<bool> {
        let mut map = self.tasks.write().map_err(|_| Self::lock_error())?;
        let Some(task) = map.get_mut(&(kind, task_id.to_string())) else {
            return Ok(false);
        };
        task.status = outcome.status();
        match outcome {
            TaskOutcome::Completed { urls } => {
                task.result_urls = urls.clone();
                task.message = None;
            }
            TaskOutcome::Failed { message } => {
                task.result_urls.clear();
                task.message = Some(message.clone());
            }
        }
        Ok(true)
    }

    async fn fetch_many(&self, kind: TaskKind, task_ids: &[String]) -> Result<Vec<TaskRecord>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let map = self.tasks.read().map_err(|_| Self::lock_error())?;
        Ok(task_ids
            .iter()
            .filter_map(|id| map.get(&(kind, id.clone())).cloned())
            .collect())
    }

    async fn mark_overtime(
        &self,
        kind: TaskKind,
        task_ids: &[String],
        message: &str,
    ) -> Result<u64> {
        self.overtime_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_overtime_writes.load(Ordering::SeqCst) {
            return Err(TaskError::Store(sqlx::Error::PoolTimedOut));
        }
        let mut map = self.tasks.write().map_err(|_| Self::lock_error())?;
        let mut updated = 0;
        for id in task_ids {
            if let Some(task) = map.get_mut(&(kind, id.clone())) {
                if task.status.is_in_flight() {
                    task.status = TaskStatus::Overtime;
                    task.message = Some(message.to_string());
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }
}
