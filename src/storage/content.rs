//! Content-addressed HTML repository
//!
//! Pages are stored under `repository/ab/cd/<sha256>.html`, where `ab` and
//! `cd` are the first two byte pairs of the hash. Identical bodies share one
//! file.

use crate::crawler::PageMetadata;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Content write failed for {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where and how a body was stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    /// Hex SHA-256 of the body
    pub hash: String,
    pub path: PathBuf,
    /// Zero when the body was already present
    pub bytes_written: u64,
    pub deduplicated: bool,
}

/// Persists fetched page bodies
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn persist(
        &self,
        url: &Url,
        body: &[u8],
        metadata: &PageMetadata,
    ) -> Result<StoredContent, ContentError>;
}

/// Filesystem repository keyed by content hash
pub struct FsContentStore {
    root: PathBuf,
    temp_seq: AtomicU64,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            temp_seq: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hex SHA-256 of a body
    pub fn content_hash(body: &[u8]) -> String {
        hex::encode(Sha256::digest(body))
    }

    /// Sharded location of a hash inside the repository
    pub fn path_for(&self, hash: &str) -> PathBuf {
        let (first, rest) = hash.split_at(hash.len().min(2));
        let second = &rest[..rest.len().min(2)];
        self.root
            .join(first)
            .join(second)
            .join(format!("{}.html", hash))
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn persist(
        &self,
        url: &Url,
        body: &[u8],
        metadata: &PageMetadata,
    ) -> Result<StoredContent, ContentError> {
        let hash = Self::content_hash(body);
        let path = self.path_for(&hash);

        if tokio::fs::try_exists(&path).await? {
            tracing::debug!(url = %url, hash = %hash, "Content already stored");
            return Ok(StoredContent {
                hash,
                path,
                bytes_written: 0,
                deduplicated: true,
            });
        }

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        // Unique temp name so concurrent writers of the same body never share a file
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let temp = path.with_extension(format!("{}.{}.tmp", std::process::id(), seq));

        let written = async {
            tokio::fs::write(&temp, body).await?;
            tokio::fs::rename(&temp, &path).await
        }
        .await;

        if let Err(source) = written {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(ContentError::Write { path, source });
        }

        tracing::debug!(
            url = %url,
            hash = %hash,
            bytes = body.len(),
            title = metadata.title.as_deref().unwrap_or(""),
            "Stored page content"
        );

        Ok(StoredContent {
            hash,
            path,
            bytes_written: body.len() as u64,
            deduplicated: false,
        })
    }
}
