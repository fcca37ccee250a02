//! Service configuration from environment variables
//!
//! Only `DATABASE_URL` is needed by every command. Provider and storage
//! credentials are checked when the generation stack is built.

use crate::error::{Result, TaskError};
use crate::provider::seedream::DEFAULT_BASE_URL;
use crate::provider::{ProviderRouter, SeedanceClient, SeedanceConfig, SeedreamClient};
use crate::storage::{ArtifactStore, LocalArtifactStore, S3ArtifactStore, S3Config};
use reqwest::Client;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_BUCKET: &str = "lighton-generated-content";
const DEFAULT_TOS_ENDPOINT: &str = "tos-cn-shanghai.volces.com";
const DEFAULT_TOS_S3_ENDPOINT: &str = "tos-s3-cn-shanghai.volces.com";
const DEFAULT_TOS_REGION: &str = "cn-shanghai";
const DEFAULT_LOCAL_PUBLIC_URL: &str = "http://localhost:8080/media";

/// Where generated artifacts are stored
#[derive(Debug, Clone)]
pub enum StorageConfig {
    S3 {
        access_key: Option<String>,
        secret_key: Option<String>,
        bucket: String,
        region: String,
        s3_endpoint: String,
        public_endpoint: String,
        path_style: bool,
    },
    Local {
        dir: PathBuf,
        public_base_url: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub api_key: Option<String>,
    pub base_url: String,
    pub storage: StorageConfig,
    pub free_users: HashSet<String>,
}

impl AppConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let storage = match get("CREEZ_LOCAL_STORAGE_DIR") {
            Some(dir) => StorageConfig::Local {
                dir: PathBuf::from(dir),
                public_base_url: get_or("CREEZ_LOCAL_PUBLIC_URL", DEFAULT_LOCAL_PUBLIC_URL),
            },
            None => StorageConfig::S3 {
                access_key: get("VOLC_STORAGE_AK"),
                secret_key: get("VOLC_STORAGE_SK"),
                bucket: get_or("VOLC_TOS_BUCKET", DEFAULT_BUCKET),
                region: get_or("VOLC_TOS_REGION", DEFAULT_TOS_REGION),
                s3_endpoint: get_or("VOLC_TOS_S3_ENDPOINT", DEFAULT_TOS_S3_ENDPOINT),
                public_endpoint: get_or("VOLC_TOS_ENDPOINT", DEFAULT_TOS_ENDPOINT),
                path_style: get("VOLC_TOS_PATH_STYLE").is_some_and(|v| parse_flag(&v)),
            },
        };

        Self {
            database_url: get("DATABASE_URL"),
            api_key: get("VOLC_API_KEY").or_else(|| get("DOUBAO_API_KEY")),
            base_url: get_or("DOUBAO_BASE_URL", DEFAULT_BASE_URL),
            storage,
            free_users: parse_free_users(get("CREEZ_FREE_USERS").as_deref().unwrap_or("")),
        }
    }

    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| TaskError::Config("DATABASE_URL not set".to_string()))
    }

    /// Provider router for every supported model
    pub fn provider(&self, client: &Client) -> Result<ProviderRouter> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            TaskError::Config("VOLC_API_KEY (or DOUBAO_API_KEY) not set".to_string())
        })?;
        url::Url::parse(&self.base_url)?;

        Ok(ProviderRouter::new(
            SeedreamClient::new(client.clone(), api_key, &self.base_url),
            SeedanceClient::new(
                client.clone(),
                api_key,
                &self.base_url,
                SeedanceConfig::default(),
            ),
        ))
    }

    /// Artifact store selected by the environment
    pub fn artifact_store(&self, client: &Client) -> Result<Arc<dyn ArtifactStore>> {
        match &self.storage {
            StorageConfig::Local {
                dir,
                public_base_url,
            } => Ok(Arc::new(LocalArtifactStore::new(dir.clone(), public_base_url))),
            StorageConfig::S3 {
                access_key,
                secret_key,
                bucket,
                region,
                s3_endpoint,
                public_endpoint,
                path_style,
            } => {
                let (Some(access_key), Some(secret_key)) = (access_key, secret_key) else {
                    return Err(TaskError::Config(
                        "VOLC_STORAGE_AK and VOLC_STORAGE_SK must be set".to_string(),
                    ));
                };
                Ok(Arc::new(S3ArtifactStore::new(
                    client.clone(),
                    S3Config {
                        access_key: access_key.clone(),
                        secret_key: secret_key.clone(),
                        bucket: bucket.clone(),
                        region: region.clone(),
                        s3_endpoint: s3_endpoint.clone(),
                        public_endpoint: public_endpoint.clone(),
                        path_style: *path_style,
                    },
                )))
            }
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Comma-separated user ids, blanks ignored
pub fn parse_free_users(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
