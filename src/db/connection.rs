//! Postgres pool shared by the task store and the billing ledger

use crate::config::AppConfig;
use crate::error::Result;
use crate::worker::WorkerConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

pub type DbPool = PgPool;

/// Connections kept free of generation runs for submits and polls
const RESERVED_CONNECTIONS: u32 = 2;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Pool size that lets every concurrent run write its outcome while
/// submits and polls still get a connection
pub fn pool_size_for(max_concurrency: usize) -> u32 {
    u32::try_from(max_concurrency)
        .unwrap_or(u32::MAX)
        .saturating_add(RESERVED_CONNECTIONS)
}

/// Connect with at most `max_connections` connections
pub async fn connect(database_url: &str, max_connections: u32) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;

    info!("Postgres pool ready (max {} connections)", max_connections);
    Ok(pool)
}

/// Pool sized for the default worker, from `DATABASE_URL`
pub async fn connect_from_env() -> Result<DbPool> {
    let config = AppConfig::from_env();
    connect(
        config.database_url()?,
        pool_size_for(WorkerConfig::default().max_concurrency),
    )
    .await
}

/// Apply `migrations/` (task tables plus `user_balance` / `token_usage`)
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Task schema up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_size_covers_runs_and_requests() {
        assert_eq!(pool_size_for(8), 10);
        assert_eq!(pool_size_for(0), 2);
        assert_eq!(pool_size_for(usize::MAX), u32::MAX);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_connect_and_migrate_twice() {
        dotenvy::dotenv().ok();
        let pool = connect_from_env().await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
    }
}
