//! Generation task table operations (`image_tasks`, `video_tasks`)
//!
//! Table and column names come from [`TaskKind`] and are never taken from
//! caller input, so they are formatted into the SQL text directly.

use crate::db::models::{TaskKind, TaskOutcome, TaskRecord, TaskStatus};
use crate::db::DbPool;
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Row};

#[derive(Debug, FromRow)]
struct TaskRow {
    task_id: String,
    status: String,
    created_at: DateTime<Utc>,
    result_urls: Vec<String>,
    message: Option<String>,
}

impl TryFrom<TaskRow> for TaskRecord {
    type Error = sqlx::Error;

    fn try_from(row: TaskRow) -> std::result::Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<TaskStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;

        Ok(TaskRecord {
            task_id: row.task_id,
            status,
            created_at: row.created_at,
            result_urls: row.result_urls,
            message: row.message,
        })
    }
}

fn select_columns(kind: TaskKind) -> String {
    format!(
        "task_id, status, created_at, {} AS result_urls, message",
        kind.url_field()
    )
}

/// Insert a pending task. `created_at` is stamped by the database.
pub async fn insert_pending(pool: &DbPool, kind: TaskKind, task_id: &str) -> Result<TaskRecord> {
    let sql = format!(
        r#"
        INSERT INTO {table} (task_id, status)
        VALUES ($1, 'pending')
        RETURNING {columns}
        "#,
        table = kind.table(),
        columns = select_columns(kind),
    );

    let row = sqlx::query_as::<_, TaskRow>(&sql)
        .bind(task_id)
        .fetch_one(pool)
        .await?;

    Ok(row.try_into()?)
}

/// Write the worker's terminal outcome.
///
/// Unconditional: a late result overwrites an `overtime` label.
/// Returns false when no row matched.
pub async fn write_outcome(
    pool: &DbPool,
    kind: TaskKind,
    task_id: &str,
    outcome: &TaskOutcome,
) -> Result<bool> {
    let (urls, message): (&[String], Option<&str>) = match outcome {
        TaskOutcome::Completed { urls } => (urls.as_slice(), None),
        TaskOutcome::Failed { message } => (&[], Some(message.as_str())),
    };

    let sql = format!(
        r#"
        UPDATE {table}
        SET status = $2,
            {urls_column} = $3,
            message = $4
        WHERE task_id = $1
        "#,
        table = kind.table(),
        urls_column = kind.url_field(),
    );

    let result = sqlx::query(&sql)
        .bind(task_id)
        .bind(outcome.status().as_str())
        .bind(urls)
        .bind(message)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Fetch every task whose id is in `task_ids`. Unknown ids are skipped.
pub async fn fetch_by_ids(
    pool: &DbPool,
    kind: TaskKind,
    task_ids: &[String],
) -> Result<Vec<TaskRecord>> {
    let sql = format!(
        "SELECT {columns} FROM {table} WHERE task_id = ANY($1)",
        columns = select_columns(kind),
        table = kind.table(),
    );

    let rows = sqlx::query_as::<_, TaskRow>(&sql)
        .bind(task_ids)
        .fetch_all(pool)
        .await?;

    rows.into_iter()
        .map(|row| TaskRecord::try_from(row).map_err(Into::into))
        .collect()
}

/// Get a task by ID
pub async fn get_by_id(pool: &DbPool, kind: TaskKind, task_id: &str) -> Result<Option<TaskRecord>> {
    let sql = format!(
        "SELECT {columns} FROM {table} WHERE task_id = $1",
        columns = select_columns(kind),
        table = kind.table(),
    );

    let row = sqlx::query_as::<_, TaskRow>(&sql)
        .bind(task_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(Some(row.try_into()?)),
        None => Ok(None),
    }
}

/// Flip in-flight tasks to overtime in one statement.
///
/// Rows that already reached a terminal status are left alone, so ids that
/// are no longer eligible are simply not counted.
pub async fn mark_overtime(
    pool: &DbPool,
    kind: TaskKind,
    task_ids: &[String],
    message: &str,
) -> Result<u64> {
    let sql = format!(
        r#"
        UPDATE {table}
        SET status = 'overtime',
            message = $2
        WHERE task_id = ANY($1)
          AND status IN ('pending', 'processing', 'isloading')
        "#,
        table = kind.table(),
    );

    let result = sqlx::query(&sql)
        .bind(task_ids)
        .bind(message)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Count tasks per status for monitoring
pub async fn count_by_status(pool: &DbPool, kind: TaskKind) -> Result<Vec<(String, i64)>> {
    let sql = format!(
        "SELECT status, COUNT(*) AS count FROM {table} GROUP BY status ORDER BY status",
        table = kind.table(),
    );

    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("status"), row.get("count")))
        .collect())
}
