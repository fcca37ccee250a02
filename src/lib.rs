//! Creez Tasks - asynchronous image and video generation
//!
//! A submission creates a `pending` task row and returns its id at once. The
//! generation itself runs in the background: the worker calls the provider,
//! uploads every artifact to object storage and writes a terminal status.
//! Clients poll by id; tasks that stay in flight past the kind's timeout are
//! reported (and persisted) as `overtime`.
//!
//! # Example
//! ```ignore
//! use creez_tasks::provider::{GenerationRequest, ImageRequest};
//!
//! let task_id = launcher
//!     .submit(GenerationRequest::Image(ImageRequest::new("a lighthouse at dusk")))
//!     .await?;
//! let views = poller
//!     .poll(TaskKind::Image, &[task_id], TaskKind::Image.default_timeout())
//!     .await?;
//! ```

pub mod billing;
pub mod config;
pub mod db;
pub mod error;
pub mod launcher;
pub mod poller;
pub mod provider;
pub mod storage;
pub mod store;
pub mod worker;

pub use config::AppConfig;
pub use db::models::{TaskKind, TaskOutcome, TaskRecord, TaskStatus, TaskView};
pub use error::{Result, TaskError};
pub use launcher::TaskLauncher;
pub use poller::{Poller, OVERTIME_MESSAGE};
pub use provider::{GenerationProvider, GenerationRequest, ImageRequest, ModelKey, VideoRequest};
pub use store::{MemoryTaskStore, PgTaskStore, TaskStore};
pub use worker::{GenerationWorker, Scheduler, WorkerConfig};
