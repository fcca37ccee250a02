//! Worker configuration

use crate::db::models::TaskKind;
use std::time::Duration;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum generations running at once
    pub max_concurrency: usize,

    /// How long shutdown waits for in-flight generations
    pub drain_timeout: Duration,

    /// Overtime threshold for image polls
    pub image_timeout: Duration,

    /// Overtime threshold for video polls
    pub video_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            drain_timeout: Duration::from_secs(65 * 60), // longest video wait plus margin
            image_timeout: TaskKind::Image.default_timeout(),
            video_timeout: TaskKind::Video.default_timeout(),
        }
    }
}

impl WorkerConfig {
    /// Create a new config builder
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }

    /// Overtime threshold for polls of `kind`
    pub fn timeout_for(&self, kind: TaskKind) -> Duration {
        match kind {
            TaskKind::Image => self.image_timeout,
            TaskKind::Video => self.video_timeout,
        }
    }
}

/// Builder for WorkerConfig
#[derive(Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Set the concurrency cap (minimum 1)
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.config.max_concurrency = max.max(1);
        self
    }

    /// Set drain timeout
    pub fn drain_timeout(mut self, duration: Duration) -> Self {
        self.config.drain_timeout = duration;
        self
    }

    /// Set drain timeout in seconds
    pub fn drain_timeout_secs(mut self, secs: u64) -> Self {
        self.config.drain_timeout = Duration::from_secs(secs);
        self
    }

    /// Set the overtime threshold for one kind
    pub fn timeout(mut self, kind: TaskKind, duration: Duration) -> Self {
        match kind {
            TaskKind::Image => self.config.image_timeout = duration,
            TaskKind::Video => self.config.video_timeout = duration,
        }
        self
    }

    /// Set the overtime threshold for one kind in minutes
    pub fn timeout_minutes(self, kind: TaskKind, minutes: u64) -> Self {
        self.timeout(kind, Duration::from_secs(minutes.saturating_mul(60)))
    }

    /// Build the config
    pub fn build(self) -> WorkerConfig {
        self.config
    }
}
