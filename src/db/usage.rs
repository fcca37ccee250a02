//! Billing table operations (`user_balance`, `token_usage`)

use crate::db::models::{NewUsage, UserBalance};
use crate::db::DbPool;
use crate::error::Result;

/// Get the balance row for a user
pub async fn get_balance(pool: &DbPool, user_id: &str) -> Result<Option<UserBalance>> {
    let balance = sqlx::query_as::<_, UserBalance>(
        r#"
        SELECT user_id, balance, granted_credits, updated_at
        FROM user_balance
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(balance)
}

/// Deduct `points` in one statement: granted credits first, the remainder
/// from the balance, which may go negative.
///
/// Both right-hand sides read the pre-update row, so concurrent deductions
/// for the same user never overwrite each other. Returns false when the user
/// has no balance row.
pub async fn deduct_points(pool: &DbPool, user_id: &str, points: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE user_balance
        SET granted_credits = GREATEST(0, granted_credits - $2),
            balance = balance - GREATEST(0, $2 - granted_credits),
            updated_at = NOW()
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(points)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Insert a usage row, returning its id
pub async fn insert_usage(pool: &DbPool, usage: &NewUsage) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO token_usage (
            user_id, chat_id, project_id, type, source, model,
            request, response, images_count, video_count, points
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id
        "#,
    )
    .bind(&usage.user_id)
    .bind(&usage.chat_id)
    .bind(&usage.project_id)
    .bind(usage.kind.as_str())
    .bind(&usage.source)
    .bind(&usage.model)
    .bind(&usage.request)
    .bind(&usage.response)
    .bind(usage.images_count)
    .bind(usage.video_count)
    .bind(usage.points)
    .fetch_one(pool)
    .await?;

    Ok(id)
}
