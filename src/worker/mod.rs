//! Background generation
//!
//! This module provides:
//! - Scheduler: process-wide owner of detached generation runs, with a drain hook
//! - GenerationWorker: runs one task (provider call, upload, billing, terminal write)
//! - WorkerConfig: concurrency, drain and overtime settings

pub mod config;
pub mod processor;
pub mod scheduler;

pub use config::WorkerConfig;
pub use processor::{GenerationWorker, GENERATION_FAILED_MESSAGE};
pub use scheduler::{DrainReport, Scheduler};
