//! Local directory artifact store for development

use super::ArtifactStore;
use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

pub struct LocalArtifactStore {
    dir: PathBuf,
    public_base_url: String,
}

impl LocalArtifactStore {
    /// Objects are written into `dir` and served from `public_base_url`
    pub fn new(dir: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            dir: dir.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put_object(
        &self,
        object_name: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(object_name);
        tokio::fs::write(&path, &bytes).await?;
        info!("Written: {}", path.display());
        Ok(format!("{}/{}", self.public_base_url, object_name))
    }
}
