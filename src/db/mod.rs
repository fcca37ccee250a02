//! Database module for creez-tasks
//!
//! Provides PostgreSQL operations for the image/video task tables and the
//! billing tables (`user_balance`, `token_usage`).

pub mod connection;
pub mod models;
pub mod tasks;
pub mod usage;

pub use connection::{connect, connect_from_env, pool_size_for, run_migrations, DbPool};
pub use models::*;
