//! Doubao Seedance video generation client
//!
//! Seedance is asynchronous upstream as well: a content generation task is
//! created, then polled until it succeeds or fails.

use super::seedream::RawUsage;
use super::{check_status, Artifact, GenerationOutput, ModelKey, Usage, VideoRequest};
use crate::error::{Result, TaskError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Upstream polling configuration
#[derive(Debug, Clone)]
pub struct SeedanceConfig {
    /// Delay between task status queries (default: 20 seconds)
    pub poll_interval: Duration,
    /// Give up after this long (default: 1 hour)
    pub max_wait: Duration,
}

impl Default for SeedanceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(20),
            max_wait: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateTaskBody {
    model: &'static str,
    #[serde(rename = "generateAudio")]
    generate_audio: bool,
    content: Vec<ContentItem>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentItem {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrl,
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<&'static str>,
    },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CreateTaskResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    content: Option<TaskContent>,
    #[serde(default)]
    usage: Option<RawUsage>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    error: Option<TaskErrorBody>,
}

#[derive(Debug, Deserialize)]
struct TaskContent {
    #[serde(default)]
    video_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Upstream task state after one query
#[derive(Debug, PartialEq)]
enum TaskState {
    Running,
    Succeeded(GenerationOutput),
    Failed(String),
}

fn build_body(model: ModelKey, request: &VideoRequest) -> CreateTaskBody {
    let mut content = vec![ContentItem::Text {
        text: format!(
            "{} --resolution 720p --duration {} --ratio {} --watermark false --camerafixed false",
            request.prompt, request.duration, request.aspect_ratio
        ),
    }];

    if let Some(first) = request.first_frame() {
        content.push(ContentItem::ImageUrl {
            image_url: ImageUrl { url: first },
            role: None,
        });
    }
    if let Some(last) = request.last_frame() {
        content.push(ContentItem::ImageUrl {
            image_url: ImageUrl { url: last },
            role: Some("last_frame"),
        });
    }

    CreateTaskBody {
        model: model.upstream_model(),
        generate_audio: request.generate_audio,
        content,
    }
}

fn parse_task(raw: TaskResponse) -> TaskState {
    match raw.status.as_str() {
        "succeeded" => {
            let artifacts = raw
                .content
                .and_then(|c| c.video_url)
                .filter(|url| !url.is_empty())
                .map(|url| vec![Artifact::url(url).with_mime("video/mp4")])
                .unwrap_or_default();
            TaskState::Succeeded(GenerationOutput {
                artifacts,
                usage: raw.usage.map(Usage::from).unwrap_or_default(),
            })
        }
        "failed" | "cancelled" => {
            let message = raw
                .error_message
                .or_else(|| raw.error.and_then(|e| e.message))
                .unwrap_or_else(|| "Video generation failed".to_string());
            TaskState::Failed(message)
        }
        _ => TaskState::Running,
    }
}

/// HTTP client for the Seedance `contents/generations/tasks` endpoint
#[derive(Debug, Clone)]
pub struct SeedanceClient {
    client: Client,
    api_key: String,
    base_url: String,
    config: SeedanceConfig,
}

impl SeedanceClient {
    pub fn new(client: Client, api_key: &str, base_url: &str, config: SeedanceConfig) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        }
    }

    fn tasks_url(&self) -> String {
        format!("{}/contents/generations/tasks", self.base_url)
    }

    /// Create an upstream task and wait for its result
    pub async fn generate(&self, model: ModelKey, request: &VideoRequest) -> Result<GenerationOutput> {
        let upstream_id = self.create_task(model, request).await?;
        info!("Seedance task created: {}", upstream_id);

        let started = Instant::now();
        while started.elapsed() < self.config.max_wait {
            match self.query_task(&upstream_id).await? {
                TaskState::Succeeded(output) => {
                    info!(
                        "Seedance task {} succeeded after {:?}",
                        upstream_id,
                        started.elapsed()
                    );
                    return Ok(output);
                }
                TaskState::Failed(message) => {
                    warn!("Seedance task {} failed: {}", upstream_id, message);
                    return Err(TaskError::Provider(message));
                }
                TaskState::Running => {
                    debug!("Seedance task {} still running", upstream_id);
                    sleep(self.config.poll_interval).await;
                }
            }
        }

        Err(TaskError::Provider(format!(
            "Seedance task {} did not finish within {:?}",
            upstream_id, self.config.max_wait
        )))
    }

    async fn create_task(&self, model: ModelKey, request: &VideoRequest) -> Result<String> {
        let body = build_body(model, request);
        let response = self
            .client
            .post(self.tasks_url())
            .bearer_auth(&self.api_key)
            .timeout(SUBMIT_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| TaskError::Provider(format!("Seedance submit failed: {}", e)))?;

        let created: CreateTaskResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| TaskError::Provider(format!("Failed to parse Seedance response: {}", e)))?;

        created
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| TaskError::Provider("No task ID in Seedance response".to_string()))
    }

    async fn query_task(&self, upstream_id: &str) -> Result<TaskState> {
        let response = self
            .client
            .get(format!("{}/{}", self.tasks_url(), upstream_id))
            .bearer_auth(&self.api_key)
            .timeout(QUERY_TIMEOUT)
            .send()
            .await
            .map_err(|e| TaskError::Provider(format!("Seedance query failed: {}", e)))?;

        let raw: TaskResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| TaskError::Provider(format!("Failed to parse Seedance task: {}", e)))?;

        Ok(parse_task(raw))
    }
}
