//! Credits and usage accounting
//!
//! Generation is gated on the user having non-negative credit. After a
//! successful run the usage is recorded and the price deducted, granted
//! credits first.

use crate::db::models::{NewUsage, TaskKind};
use crate::db::{usage, DbPool};
use crate::provider::{ModelKey, Usage};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{error, info, warn};

/// Message stored on tasks refused by the credit check
pub const QUOTA_EXCEEDED_MESSAGE: &str = "insufficient credits, try again tomorrow or top up";

/// Points charged for an image run
pub fn image_price(model: ModelKey) -> i64 {
    match model {
        ModelKey::Seedream40 | ModelKey::Seedream45 => 2,
        _ => 0,
    }
}

/// Points charged for a video run, from upstream token usage
pub fn video_price(model: ModelKey, usage: &Usage, generate_audio: bool) -> i64 {
    let tokens = usage.total_tokens.unwrap_or(0).max(0) as f64;
    let per_million = match model {
        ModelKey::SeedancePro if generate_audio => 16.0,
        ModelKey::SeedancePro => 8.0,
        ModelKey::SeedanceLite => 10.0,
        _ => return 0,
    };
    ((tokens * per_million / 1_000_000.0 * 10.0).ceil() as i64).max(1)
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Whether the user may start a generation
    async fn has_credit(&self, user_id: &str) -> bool;

    /// Record usage and deduct its points. Failures are logged, not returned.
    async fn record_usage(&self, usage: NewUsage);
}

/// Ledger over the shared `user_balance` / `token_usage` tables
pub struct PgLedger {
    pool: DbPool,
    free_users: HashSet<String>,
}

impl PgLedger {
    pub fn new(pool: DbPool, free_users: HashSet<String>) -> Self {
        Self { pool, free_users }
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn has_credit(&self, user_id: &str) -> bool {
        if self.free_users.contains(user_id) {
            return true;
        }
        match usage::get_balance(&self.pool, user_id).await {
            Ok(Some(balance)) => balance.has_credit(),
            Ok(None) => {
                error!("User {} has no balance record", user_id);
                false
            }
            Err(e) => {
                error!("Failed to check user points: {}", e);
                false
            }
        }
    }

    async fn record_usage(&self, new_usage: NewUsage) {
        if let Err(e) = usage::insert_usage(&self.pool, &new_usage).await {
            error!("Failed to save model usage for {}: {}", new_usage.model, e);
            return;
        }
        info!(
            "Saved {} usage: model={}, points={}",
            new_usage.kind, new_usage.model, new_usage.points
        );

        let Some(user_id) = new_usage.user_id.as_deref() else {
            return;
        };
        if new_usage.points <= 0 {
            return;
        }
        match usage::deduct_points(&self.pool, user_id, new_usage.points).await {
            Ok(true) => {}
            Ok(false) => warn!("User {} balance record not found, {} points not deducted", user_id, new_usage.points),
            Err(e) => warn!(
                "Failed to deduct {} points from user {}: {}",
                new_usage.points, user_id, e
            ),
        }
    }
}

/// Ledger that lets everyone through and records nothing
#[derive(Debug, Default)]
pub struct UnmeteredLedger;

#[async_trait]
impl Ledger for UnmeteredLedger {
    async fn has_credit(&self, _user_id: &str) -> bool {
        true
    }

    async fn record_usage(&self, _usage: NewUsage) {}
}

/// Points for a finished run
pub fn price_for(kind: TaskKind, model: ModelKey, usage: &Usage, generate_audio: bool) -> i64 {
    match kind {
        TaskKind::Image => image_price(model),
        TaskKind::Video => video_price(model, usage, generate_audio),
    }
}
