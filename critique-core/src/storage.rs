//! Object storage for captured screenshots.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::StorageConfig;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid object path '{0}'")]
    InvalidPath(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Persist `bytes` under the relative object path.
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Fetchable URL for a stored object.
    fn public_url(&self, path: &str) -> Result<String, StorageError>;
}

/// Stores objects under a root directory; URLs are `{public_base_url}/{path}`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.root_dir, &config.public_base_url)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Reject absolute paths and anything that walks out of the root.
fn validate_path(path: &str) -> Result<&str, StorageError> {
    let trimmed = path.trim().trim_start_matches('/');
    let ok = !trimmed.is_empty()
        && Path::new(trimmed)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(trimmed)
    } else {
        Err(StorageError::InvalidPath(path.to_string()))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let rel = validate_path(path)?;
        let full = self.root.join(rel);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        tracing::debug!(path = %full.display(), bytes = bytes.len(), "Stored object");
        Ok(())
    }

    fn public_url(&self, path: &str) -> Result<String, StorageError> {
        let rel = validate_path(path)?;
        Ok(format!("{}/{}", self.public_base_url, rel))
    }
}
