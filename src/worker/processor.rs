//! Generation worker: runs a single task to its terminal state

use crate::billing::{price_for, Ledger, QUOTA_EXCEEDED_MESSAGE};
use crate::db::models::{NewUsage, TaskKind, TaskOutcome};
use crate::error::{Result, TaskError};
use crate::provider::{GenerationProvider, GenerationRequest};
use crate::storage::ArtifactUploader;
use crate::store::TaskStore;
use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Message stored on tasks whose run panicked or could not be scheduled
pub const GENERATION_FAILED_MESSAGE: &str = "content generation failed";

/// Runs generation requests and writes their outcome to the task store
#[derive(Clone)]
pub struct GenerationWorker {
    store: Arc<dyn TaskStore>,
    provider: Arc<dyn GenerationProvider>,
    uploader: ArtifactUploader,
    ledger: Arc<dyn Ledger>,
}

impl GenerationWorker {
    pub fn new(
        store: Arc<dyn TaskStore>,
        provider: Arc<dyn GenerationProvider>,
        uploader: ArtifactUploader,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            store,
            provider,
            uploader,
            ledger,
        }
    }

    /// Run one task and write its terminal outcome.
    ///
    /// Never fails: every error (and panic) inside generation becomes a
    /// `failed` record. Returns the outcome that was written.
    pub async fn run(&self, task_id: &str, request: &GenerationRequest) -> TaskOutcome {
        let kind = request.kind();
        info!("Running {} task {}: model={}", kind, task_id, request.model());

        let result = AssertUnwindSafe(self.generate(request)).catch_unwind().await;

        let outcome = match result {
            Ok(Ok(urls)) => {
                info!("Task {} completed with {} artifacts", task_id, urls.len());
                TaskOutcome::Completed { urls }
            }
            Ok(Err(e)) if e.is_quota() => {
                error!("Task {} out of quota: {}", task_id, e);
                TaskOutcome::Failed {
                    message: QUOTA_EXCEEDED_MESSAGE.to_string(),
                }
            }
            Ok(Err(e)) => {
                error!("Task {} failed: {}", task_id, e);
                TaskOutcome::Failed {
                    message: e.to_string(),
                }
            }
            Err(_) => {
                error!("Task {} panicked during generation", task_id);
                TaskOutcome::Failed {
                    message: GENERATION_FAILED_MESSAGE.to_string(),
                }
            }
        };

        match self.store.write_outcome(kind, task_id, &outcome).await {
            Ok(true) => {}
            Ok(false) => warn!("Task {} not found when writing {}", task_id, outcome.status()),
            Err(e) => error!(
                "Failed to write {} for task {}: {}",
                outcome.status(),
                task_id,
                e
            ),
        }

        outcome
    }

    /// Credit check, provider call, uploads and usage. Returns uploaded URLs.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Vec<String>> {
        let kind = request.kind();
        let context = request.context();

        if let Some(user_id) = context.user_id.as_deref() {
            if !self.ledger.has_credit(user_id).await {
                return Err(TaskError::QuotaExceeded {
                    user_id: user_id.to_string(),
                });
            }
        }

        let model = request.model_key()?;
        let output = self.provider.generate(model, request).await?;
        info!(
            "Provider returned {} artifacts for model {}",
            output.artifacts.len(),
            model
        );

        let mut urls = Vec::with_capacity(output.artifacts.len());
        for artifact in &output.artifacts {
            match self.uploader.upload(kind, artifact).await {
                Ok(url) => urls.push(url),
                Err(e) => warn!("Upload {} artifact failed: {}", kind, e),
            }
        }

        if urls.is_empty() {
            return Err(TaskError::NoArtifacts);
        }

        let generate_audio = match request {
            GenerationRequest::Video(video) => video.generate_audio,
            GenerationRequest::Image(_) => false,
        };
        let points = price_for(kind, model, &output.usage, generate_audio);
        let count = urls.len() as i32;

        self.ledger
            .record_usage(NewUsage {
                user_id: context.user_id.clone(),
                chat_id: context.chat_id.clone(),
                project_id: context.project_id.clone(),
                kind,
                source: context.source.clone(),
                model: model.as_str().to_string(),
                request: usage_request(request),
                response: json!(urls),
                images_count: (kind == TaskKind::Image).then_some(count),
                video_count: (kind == TaskKind::Video).then_some(count),
                points,
            })
            .await;

        Ok(urls)
    }
}

fn usage_request(request: &GenerationRequest) -> serde_json::Value {
    match request {
        GenerationRequest::Image(image) => json!({
            "prompt": image.prompt,
            "aspect_ratio": image.aspect_ratio,
        }),
        GenerationRequest::Video(video) => json!({
            "prompt": video.prompt,
            "duration": video.duration,
            "aspect_ratio": video.aspect_ratio,
            "generate_audio": video.generate_audio,
        }),
    }
}
