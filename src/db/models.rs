//! Task and billing models matching the Postgres schema in `migrations/`

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Task kinds
// ============================================================================

/// Task domain. Each kind owns a table and a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Image,
    Video,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Image => "image",
            TaskKind::Video => "video",
        }
    }

    /// Table holding tasks of this kind
    pub fn table(&self) -> &'static str {
        match self {
            TaskKind::Image => "image_tasks",
            TaskKind::Video => "video_tasks",
        }
    }

    /// Column (and wire field) holding the result URLs
    pub fn url_field(&self) -> &'static str {
        match self {
            TaskKind::Image => "image_urls",
            TaskKind::Video => "video_urls",
        }
    }

    /// Default overtime threshold for polls of this kind
    pub fn default_timeout(&self) -> Duration {
        match self {
            TaskKind::Image => Duration::from_secs(10 * 60),
            TaskKind::Video => Duration::from_secs(30 * 60),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" | "images" => Ok(TaskKind::Image),
            "video" | "videos" => Ok(TaskKind::Video),
            other => Err(format!("unknown task kind: {other}")),
        }
    }
}

// ============================================================================
// Task status
// ============================================================================

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[serde(alias = "isloading")]
    Pending,
    Processing,
    Completed,
    Failed,
    Overtime,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Overtime => "overtime",
        }
    }

    /// Still waiting on the worker's terminal write
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Processing)
    }

    /// Completed and failed are authoritative. Overtime is a soft label.
    pub fn is_terminal(&self) -> bool {
        !self.is_in_flight()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" | "isloading" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "overtime" => Ok(TaskStatus::Overtime),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

// ============================================================================
// Task records
// ============================================================================

/// One row of `image_tasks` / `video_tasks`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub result_urls: Vec<String>,
    pub message: Option<String>,
}

impl TaskRecord {
    /// Fresh pending record as inserted by the launcher
    pub fn pending(task_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            created_at,
            result_urls: Vec::new(),
            message: None,
        }
    }
}

/// Terminal outcome written once by the worker
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed { urls: Vec<String> },
    Failed { message: String },
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Completed { .. } => TaskStatus::Completed,
            TaskOutcome::Failed { .. } => TaskStatus::Failed,
        }
    }
}

/// Poll result for a single task.
///
/// Serializes with the kind's result field name, e.g.
/// `{"task_id": "..", "status": "completed", "image_urls": [..], "message": null}`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskView {
    pub kind: TaskKind,
    pub task_id: String,
    pub status: TaskStatus,
    pub result_urls: Vec<String>,
    pub message: Option<String>,
}

impl TaskView {
    pub fn from_record(kind: TaskKind, record: TaskRecord) -> Self {
        Self {
            kind,
            task_id: record.task_id,
            status: record.status,
            result_urls: record.result_urls,
            message: record.message,
        }
    }
}

impl Serialize for TaskView {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("task_id", &self.task_id)?;
        map.serialize_entry("status", &self.status)?;
        map.serialize_entry(self.kind.url_field(), &self.result_urls)?;
        map.serialize_entry("message", &self.message)?;
        map.end()
    }
}

// ============================================================================
// Billing
// ============================================================================

/// UserBalance - Matches user_balance table
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct UserBalance {
    pub user_id: String,
    pub balance: i64,
    pub granted_credits: i64,
    pub updated_at: DateTime<Utc>,
}

impl UserBalance {
    /// Credit check used before generation. Zero total still passes.
    pub fn has_credit(&self) -> bool {
        self.balance + self.granted_credits >= 0
    }
}

/// NewUsage - For inserting into token_usage
#[derive(Debug, Clone, Serialize)]
pub struct NewUsage {
    pub user_id: Option<String>,
    pub chat_id: Option<String>,
    pub project_id: Option<String>,
    pub kind: TaskKind,
    pub source: String,
    pub model: String,
    pub request: serde_json::Value,
    pub response: serde_json::Value,
    pub images_count: Option<i32>,
    pub video_count: Option<i32>,
    pub points: i64,
}
