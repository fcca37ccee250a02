//! Artifact storage
//!
//! Providers hand back either inline base64 or a short-lived URL. The
//! [`ArtifactUploader`] turns either into bytes and stores them through an
//! [`ArtifactStore`], returning the durable public URL.

pub mod local;
pub mod s3;

use crate::db::models::TaskKind;
use crate::error::{Result, TaskError};
use crate::provider::{Artifact, ArtifactPayload};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub use local::LocalArtifactStore;
pub use s3::{S3ArtifactStore, S3Config};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `object_name` and return the public URL
    async fn put_object(&self, object_name: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<String>;
}

/// File extension for an artifact of `kind` with an optional MIME type
pub fn extension_for(kind: TaskKind, mime: Option<&str>) -> &'static str {
    match (kind, mime) {
        (TaskKind::Image, None) => ".png",
        (TaskKind::Image, Some(m)) if m.contains("jpeg") || m.contains("jpg") => ".jpg",
        (TaskKind::Image, Some(m)) if m.contains("png") => ".png",
        (TaskKind::Image, Some(m)) if m.contains("webp") => ".webp",
        (TaskKind::Image, Some(_)) => ".bin",
        (TaskKind::Video, Some(m)) if m.contains("webm") => ".webm",
        (TaskKind::Video, Some(m)) if m.contains("mov") || m.contains("quicktime") => ".mov",
        (TaskKind::Video, _) => ".mp4",
    }
}

/// Content type to store an artifact with
pub fn content_type_for(kind: TaskKind, mime: Option<&str>) -> String {
    match (kind, mime) {
        (_, Some(m)) if !m.is_empty() => m.to_string(),
        (TaskKind::Image, _) => "image/png".to_string(),
        (TaskKind::Video, _) => "video/mp4".to_string(),
    }
}

/// Fresh object name: `<uuid><ext>`
pub fn object_name(kind: TaskKind, mime: Option<&str>) -> String {
    format!("{}{}", uuid::Uuid::new_v4(), extension_for(kind, mime))
}

/// Split a `data:<mime>;base64,<payload>` URL. Plain base64 has no MIME.
fn split_data_url(data: &str) -> (Option<&str>, &str) {
    match data.strip_prefix("data:").and_then(|rest| rest.split_once(',')) {
        Some((meta, payload)) => {
            let mime = meta.trim_end_matches(";base64");
            ((!mime.is_empty()).then_some(mime), payload)
        }
        None => (None, data),
    }
}

/// Moves provider artifacts into an [`ArtifactStore`]
#[derive(Clone)]
pub struct ArtifactUploader {
    store: Arc<dyn ArtifactStore>,
    http: Client,
}

impl ArtifactUploader {
    pub fn new(store: Arc<dyn ArtifactStore>, http: Client) -> Self {
        Self { store, http }
    }

    /// Upload one artifact and return its durable URL
    pub async fn upload(&self, kind: TaskKind, artifact: &Artifact) -> Result<String> {
        let (bytes, mime) = match &artifact.payload {
            ArtifactPayload::Base64(data) => {
                let (data_mime, payload) = split_data_url(data);
                let mime = artifact.mime.clone().or_else(|| data_mime.map(str::to_string));
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(payload.trim())
                    .map_err(|e| TaskError::Upload {
                        object: "inline artifact".to_string(),
                        reason: format!("invalid base64: {}", e),
                    })?;
                (bytes, mime)
            }
            ArtifactPayload::Url(url) => (self.download(url).await?, artifact.mime.clone()),
        };

        let name = object_name(kind, mime.as_deref());
        let content_type = content_type_for(kind, mime.as_deref());
        debug!("Uploading {} ({} bytes, {})", name, bytes.len(), content_type);
        self.store.put_object(&name, bytes, &content_type).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let upload_error = |reason: String| TaskError::Upload {
            object: url.to_string(),
            reason,
        };

        let response = self
            .http
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| upload_error(format!("download failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(upload_error(format!(
                "download returned HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| upload_error(format!("download body failed: {}", e)))?;
        Ok(bytes.to_vec())
    }
}
