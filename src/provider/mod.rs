//! Generation providers
//!
//! Requests name a model by string. The worker resolves it to a [`ModelKey`]
//! and hands it to a [`GenerationProvider`]. [`ProviderRouter`] is the
//! production provider: it matches on the key and forwards to the client that
//! serves it.

pub mod seedance;
pub mod seedream;

use crate::db::models::TaskKind;
use crate::error::{Result, TaskError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use seedance::{SeedanceClient, SeedanceConfig};
pub use seedream::SeedreamClient;

/// Default model for image requests
pub const DEFAULT_IMAGE_MODEL: &str = "doubao-seedream-4-0";

/// Default model for video requests
pub const DEFAULT_VIDEO_MODEL: &str = "doubao-seedance-pro";

/// Default aspect ratio for both kinds
pub const DEFAULT_ASPECT_RATIO: &str = "16:9";

/// Default video duration in seconds
pub const DEFAULT_VIDEO_DURATION: u32 = 5;

// ============================================================================
// Model keys
// ============================================================================

/// Every model the service can route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKey {
    Seedream40,
    Seedream45,
    SeedancePro,
    SeedanceLite,
}

impl ModelKey {
    /// Client-facing model name
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKey::Seedream40 => "doubao-seedream-4-0",
            ModelKey::Seedream45 => "doubao-seedream-4-5",
            ModelKey::SeedancePro => "doubao-seedance-pro",
            ModelKey::SeedanceLite => "doubao-seedance-lite",
        }
    }

    /// Versioned model id sent to the upstream API
    pub fn upstream_model(&self) -> &'static str {
        match self {
            ModelKey::Seedream40 => "doubao-seedream-4-0-250828",
            ModelKey::Seedream45 => "doubao-seedream-4-5-251128",
            ModelKey::SeedancePro | ModelKey::SeedanceLite => "doubao-seedance-1-5-pro-251215",
        }
    }

    /// Which task kind this model produces
    pub fn kind(&self) -> TaskKind {
        match self {
            ModelKey::Seedream40 | ModelKey::Seedream45 => TaskKind::Image,
            ModelKey::SeedancePro | ModelKey::SeedanceLite => TaskKind::Video,
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKey {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "doubao-seedream-4-0" => Ok(ModelKey::Seedream40),
            "doubao-seedream-4-5" => Ok(ModelKey::Seedream45),
            "doubao-seedance-pro" => Ok(ModelKey::SeedancePro),
            "doubao-seedance-lite" => Ok(ModelKey::SeedanceLite),
            _ => Err(TaskError::UnsupportedModel(s.to_string())),
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Reference media as clients send it: a bare URL, `{ "url": .. }`, or an
/// inline `{ "type": "base64", "data": "data:..." }` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaRef {
    Url(String),
    Linked {
        url: String,
    },
    Inline {
        #[serde(rename = "type")]
        kind: String,
        data: String,
    },
}

impl MediaRef {
    /// URL (or data URL) the provider can fetch, if any
    pub fn as_url(&self) -> Option<&str> {
        match self {
            MediaRef::Url(url) | MediaRef::Linked { url } if !url.trim().is_empty() => {
                Some(url.as_str())
            }
            MediaRef::Inline { kind, data } if kind == "base64" && !data.is_empty() => {
                Some(data.as_str())
            }
            _ => None,
        }
    }
}

/// Usable URLs from a list of media references, in order
pub fn reference_urls(refs: &[MediaRef]) -> Vec<String> {
    refs.iter()
        .filter_map(MediaRef::as_url)
        .map(str::to_string)
        .collect()
}

/// Who asked, for billing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub user_id: Option<String>,
    pub chat_id: Option<String>,
    pub project_id: Option<String>,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "creez".to_string()
}

fn default_image_model() -> String {
    DEFAULT_IMAGE_MODEL.to_string()
}

fn default_video_model() -> String {
    DEFAULT_VIDEO_MODEL.to_string()
}

fn default_aspect_ratio() -> String {
    DEFAULT_ASPECT_RATIO.to_string()
}

fn default_duration() -> u32 {
    DEFAULT_VIDEO_DURATION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    #[serde(default = "default_image_model")]
    pub model: String,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default, alias = "reference_image_list")]
    pub reference_images: Vec<MediaRef>,
    #[serde(flatten)]
    pub context: RequestContext,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: default_image_model(),
            aspect_ratio: default_aspect_ratio(),
            reference_images: Vec::new(),
            context: RequestContext {
                source: default_source(),
                ..Default::default()
            },
        }
    }
}

/// Video request. `frames[0]` is the first frame, `frames[1]` the last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRequest {
    pub prompt: String,
    #[serde(default = "default_video_model")]
    pub model: String,
    #[serde(default)]
    pub frames: Vec<MediaRef>,
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default)]
    pub generate_audio: bool,
    #[serde(flatten)]
    pub context: RequestContext,
}

impl VideoRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: default_video_model(),
            frames: Vec::new(),
            duration: default_duration(),
            aspect_ratio: default_aspect_ratio(),
            generate_audio: false,
            context: RequestContext {
                source: default_source(),
                ..Default::default()
            },
        }
    }

    pub fn first_frame(&self) -> Option<String> {
        reference_urls(&self.frames).into_iter().next()
    }

    pub fn last_frame(&self) -> Option<String> {
        reference_urls(&self.frames).into_iter().nth(1)
    }
}

/// A submitted generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GenerationRequest {
    Image(ImageRequest),
    Video(VideoRequest),
}

impl GenerationRequest {
    pub fn kind(&self) -> TaskKind {
        match self {
            GenerationRequest::Image(_) => TaskKind::Image,
            GenerationRequest::Video(_) => TaskKind::Video,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            GenerationRequest::Image(r) => &r.model,
            GenerationRequest::Video(r) => &r.model,
        }
    }

    pub fn context(&self) -> &RequestContext {
        match self {
            GenerationRequest::Image(r) => &r.context,
            GenerationRequest::Video(r) => &r.context,
        }
    }

    /// Resolve the model name, rejecting models of the wrong kind
    pub fn model_key(&self) -> Result<ModelKey> {
        let key: ModelKey = self.model().parse()?;
        if key.kind() != self.kind() {
            return Err(TaskError::UnsupportedModel(format!(
                "{} cannot serve {} requests",
                key,
                self.kind()
            )));
        }
        Ok(key)
    }
}

// ============================================================================
// Results
// ============================================================================

/// Where an artifact's bytes live
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactPayload {
    /// Hosted by the provider; must be downloaded and re-uploaded
    Url(String),
    /// Inline base64 (optionally a `data:` URL)
    Base64(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub payload: ArtifactPayload,
    pub mime: Option<String>,
}

impl Artifact {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            payload: ArtifactPayload::Url(url.into()),
            mime: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

/// Token usage reported by the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Usage {
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOutput {
    pub artifacts: Vec<Artifact>,
    pub usage: Usage,
}

// ============================================================================
// Dispatch
// ============================================================================

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Run one generation. `model` has already been checked against the
    /// request kind.
    async fn generate(&self, model: ModelKey, request: &GenerationRequest)
        -> Result<GenerationOutput>;
}

/// Routes each model key to the client that serves it
pub struct ProviderRouter {
    seedream: SeedreamClient,
    seedance: SeedanceClient,
}

impl ProviderRouter {
    pub fn new(seedream: SeedreamClient, seedance: SeedanceClient) -> Self {
        Self { seedream, seedance }
    }
}

#[async_trait]
impl GenerationProvider for ProviderRouter {
    async fn generate(
        &self,
        model: ModelKey,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput> {
        match (model, request) {
            (ModelKey::Seedream40 | ModelKey::Seedream45, GenerationRequest::Image(req)) => {
                self.seedream.generate(model, req).await
            }
            (ModelKey::SeedancePro | ModelKey::SeedanceLite, GenerationRequest::Video(req)) => {
                self.seedance.generate(model, req).await
            }
            (model, request) => Err(TaskError::UnsupportedModel(format!(
                "{} cannot serve {} requests",
                model,
                request.kind()
            ))),
        }
    }
}

/// Turn a non-success response into a provider error
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(TaskError::ProviderStatus { status, body })
}
