//! Poller: current task status with overtime detection
//!
//! A poll reads the requested records, relabels the ones that have been in
//! flight longer than the timeout as `overtime`, and persists that label for
//! all of them in one bulk write. The returned view never depends on that
//! write succeeding.

use crate::db::models::{TaskKind, TaskRecord, TaskStatus, TaskView};
use crate::error::Result;
use crate::store::TaskStore;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Message attached to tasks relabelled as overtime
pub const OVERTIME_MESSAGE: &str = "generation timed out";

/// Whether `record` has been in flight for strictly longer than `timeout`
pub fn is_overtime(record: &TaskRecord, timeout: Duration, now: DateTime<Utc>) -> bool {
    if !record.status.is_in_flight() {
        return false;
    }
    let timeout = TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX);
    now - record.created_at > timeout
}

#[derive(Clone)]
pub struct Poller {
    store: Arc<dyn TaskStore>,
}

impl Poller {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Poll `task_ids` of `kind` as of now
    pub async fn poll(
        &self,
        kind: TaskKind,
        task_ids: &[String],
        timeout: Duration,
    ) -> Result<BTreeMap<String, TaskView>> {
        self.poll_at(kind, task_ids, timeout, Utc::now()).await
    }

    /// Poll `task_ids` of `kind` as of `now`.
    ///
    /// Unknown ids are absent from the result. An empty input returns an
    /// empty map without touching the store.
    pub async fn poll_at(
        &self,
        kind: TaskKind,
        task_ids: &[String],
        timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<String, TaskView>> {
        let ids: Vec<String> = task_ids
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let records = self.store.fetch_many(kind, &ids).await?;
        debug!("Polled {} {} task(s), found {}", ids.len(), kind, records.len());

        let mut stale = Vec::new();
        let mut views = BTreeMap::new();
        for record in records {
            let mut view = TaskView::from_record(kind, record.clone());
            if is_overtime(&record, timeout, now) {
                view.status = TaskStatus::Overtime;
                view.message = Some(OVERTIME_MESSAGE.to_string());
                stale.push(record.task_id);
            }
            views.insert(view.task_id.clone(), view);
        }

        if !stale.is_empty() {
            match self.store.mark_overtime(kind, &stale, OVERTIME_MESSAGE).await {
                Ok(updated) => info!(
                    "Marked {} of {} stale {} task(s) as overtime",
                    updated,
                    stale.len(),
                    kind
                ),
                Err(e) => warn!(
                    "Failed to mark {} {} task(s) as overtime: {}",
                    stale.len(),
                    kind,
                    e
                ),
            }
        }

        Ok(views)
    }
}
