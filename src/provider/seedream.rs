//! Doubao Seedream image generation client

use super::{check_status, reference_urls, Artifact, GenerationOutput, ImageRequest, ModelKey, Usage};
use crate::error::{Result, TaskError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Default Ark API base URL
pub const DEFAULT_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Serialize)]
struct ImagesGenerationBody<'a> {
    model: &'a str,
    prompt: &'a str,
    sequential_image_generation: &'a str,
    response_format: &'a str,
    size: String,
    watermark: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    image: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ImagesGenerationResponse {
    #[serde(default)]
    data: Option<ImageData>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImageData {
    Many(Vec<Option<ImageItem>>),
    One(ImageItem),
}

#[derive(Debug, Deserialize)]
struct ImageItem {
    #[serde(default)]
    url: Option<String>,
}

/// Usage block, snake_case or camelCase depending on endpoint version
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawUsage {
    #[serde(default, alias = "inputTokens", alias = "prompt_tokens")]
    input_tokens: Option<i64>,
    #[serde(default, alias = "outputTokens", alias = "completion_tokens")]
    output_tokens: Option<i64>,
    #[serde(default, alias = "totalTokens")]
    total_tokens: Option<i64>,
}

impl From<RawUsage> for Usage {
    fn from(raw: RawUsage) -> Self {
        Usage {
            input_tokens: raw.input_tokens,
            output_tokens: raw.output_tokens,
            total_tokens: raw.total_tokens,
        }
    }
}

/// Pixel size for an aspect ratio. Unknown ratios fall back to square.
pub fn size_for_aspect_ratio(aspect_ratio: &str) -> (u32, u32) {
    match aspect_ratio {
        "1:1" => (2048, 2048),
        "3:4" => (1728, 2304),
        "4:3" => (2304, 1728),
        "16:9" => (2560, 1440),
        "9:16" => (1440, 2560),
        "2:3" => (1664, 2496),
        "3:2" => (2496, 1664),
        "21:9" => (3024, 1296),
        _ => (2048, 2048),
    }
}

/// HTTP client for the Seedream `images/generations` endpoint
#[derive(Debug, Clone)]
pub struct SeedreamClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl SeedreamClient {
    pub fn new(client: Client, api_key: &str, base_url: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Generate images for a request
    pub async fn generate(&self, model: ModelKey, request: &ImageRequest) -> Result<GenerationOutput> {
        let (width, height) = size_for_aspect_ratio(&request.aspect_ratio);
        let body = ImagesGenerationBody {
            model: model.upstream_model(),
            prompt: &request.prompt,
            sequential_image_generation: "auto",
            response_format: "url",
            size: format!("{}x{}", width, height),
            watermark: false,
            image: reference_urls(&request.reference_images),
        };

        info!(
            "Seedream request: model={}, size={}, references={}",
            body.model,
            body.size,
            body.image.len()
        );

        let url = format!("{}/images/generations", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| TaskError::Provider(format!("Seedream request failed: {}", e)))?;

        let response = check_status(response).await?;
        let raw: ImagesGenerationResponse = response
            .json()
            .await
            .map_err(|e| TaskError::Provider(format!("Failed to parse Seedream response: {}", e)))?;

        let output = parse_response(raw);
        debug!("Seedream returned {} images", output.artifacts.len());
        Ok(output)
    }
}

fn parse_response(raw: ImagesGenerationResponse) -> GenerationOutput {
    let items = match raw.data {
        Some(ImageData::One(item)) => vec![item],
        Some(ImageData::Many(items)) => items.into_iter().flatten().collect(),
        None => Vec::new(),
    };

    let artifacts = items
        .into_iter()
        .filter_map(|item| item.url)
        .filter(|url| !url.is_empty())
        .map(Artifact::url)
        .collect();

    GenerationOutput {
        artifacts,
        usage: raw.usage.map(Usage::from).unwrap_or_default(),
    }
}
