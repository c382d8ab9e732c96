use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use crate::configuration::StorageSettings;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to write artifact {key}: {source}")]
    Io {
        key: String,
        source: std::io::Error,
    },
    #[error("failed to encode artifact: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where screenshots and traces of a run end up.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put_screenshot(
        &self,
        run_id: Uuid,
        target_slug: &str,
        png: Vec<u8>,
    ) -> Result<String, StorageError>;

    async fn put_trace(
        &self,
        run_id: Uuid,
        target_slug: &str,
        trace: &serde_json::Value,
    ) -> Result<String, StorageError>;
}

pub fn screenshot_key(run_id: Uuid, target_slug: &str) -> String {
    format!("runs/{}/{}/step-1.png", run_id, target_slug)
}

pub fn trace_key(run_id: Uuid, target_slug: &str) -> String {
    format!("runs/{}/{}/trace.json", run_id, target_slug)
}

/// Writes artifacts below a local directory and hands out urls under
/// `{public_base_url}/artifacts/`.
pub struct LocalArtifactStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalArtifactStore {
    pub fn new(settings: StorageSettings) -> Self {
        LocalArtifactStore {
            root: settings.root,
            public_base_url: settings.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn put_bytes(&self, key: String, bytes: Vec<u8>) -> Result<String, StorageError> {
        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Io {
                    key: key.clone(),
                    source,
                })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Io {
                key: key.clone(),
                source,
            })?;

        log::info!("Stored artifact {}", key);
        Ok(format!("{}/artifacts/{}", self.public_base_url, key))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put_screenshot(
        &self,
        run_id: Uuid,
        target_slug: &str,
        png: Vec<u8>,
    ) -> Result<String, StorageError> {
        self.put_bytes(screenshot_key(run_id, target_slug), png).await
    }

    async fn put_trace(
        &self,
        run_id: Uuid,
        target_slug: &str,
        trace: &serde_json::Value,
    ) -> Result<String, StorageError> {
        let bytes = serde_json::to_vec_pretty(trace)?;
        self.put_bytes(trace_key(run_id, target_slug), bytes).await
    }
}
