//! Checkpoint system for resumable crawling
//!
//! The coordinator's `SessionState` is periodically written to
//! `<data-root>/state/checkpoint.json` so a restarted crawl picks up its
//! counters where it left off. The file is an envelope carrying a format
//! version and a SHA-256 checksum of the state; anything that fails either
//! check is reported as corrupt and the caller falls back to counters derived
//! from the frontier.
//!
//! # Example
//!
//! ```no_run
//! use sumi_crawl::checkpoint::CheckpointManager;
//! use sumi_crawl::SessionState;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), sumi_crawl::checkpoint::CheckpointError> {
//! let manager = CheckpointManager::new("./data/state/checkpoint.json", Duration::from_secs(10), 50);
//! manager.save(&SessionState::new(500))?;
//!
//! if let Some(restored) = manager.load()? {
//!     println!("Resuming with {} pages fetched", restored.pages_fetched);
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::OutputConfig;
use crate::state::SessionState;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Current checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt checkpoint: {0}")]
    Corrupt(String),

    #[error("Unsupported checkpoint version {found} (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    checksum: String,
    state: serde_json::Value,
}

/// Manages the session checkpoint file
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    path: PathBuf,
    interval: Duration,
    every_pages: u64,
}

impl CheckpointManager {
    /// Creates a manager writing to `path`
    ///
    /// A zero `interval` or `every_pages` disables that trigger.
    pub fn new(path: impl Into<PathBuf>, interval: Duration, every_pages: u64) -> Self {
        Self {
            path: path.into(),
            interval,
            every_pages,
        }
    }

    pub fn from_config(output: &OutputConfig) -> Self {
        Self::new(
            output.checkpoint_path(),
            Duration::from_secs(output.checkpoint_interval_sec),
            output.checkpoint_every_pages,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Serializes the state into a checksummed envelope
    pub fn snapshot(&self, state: &SessionState) -> Result<Vec<u8>, CheckpointError> {
        let value = serde_json::to_value(state).map_err(|e| CheckpointError::Corrupt(e.to_string()))?;
        let envelope = Envelope {
            version: CHECKPOINT_VERSION,
            checksum: checksum(&value)?,
            state: value,
        };
        serde_json::to_vec_pretty(&envelope).map_err(|e| CheckpointError::Corrupt(e.to_string()))
    }

    /// Parses and verifies an envelope produced by `snapshot`
    pub fn restore(&self, bytes: &[u8]) -> Result<SessionState, CheckpointError> {
        let envelope: Envelope = serde_json::from_slice(bytes)
            .map_err(|e| CheckpointError::Corrupt(format!("unreadable envelope: {}", e)))?;

        if envelope.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                found: envelope.version,
                expected: CHECKPOINT_VERSION,
            });
        }

        let actual = checksum(&envelope.state)?;
        if actual != envelope.checksum {
            return Err(CheckpointError::Corrupt(format!(
                "checksum mismatch (stored {}, computed {})",
                envelope.checksum, actual
            )));
        }

        serde_json::from_value(envelope.state)
            .map_err(|e| CheckpointError::Corrupt(format!("invalid session state: {}", e)))
    }

    /// Writes the checkpoint atomically (temp file, fsync, rename)
    pub fn save(&self, state: &SessionState) -> Result<(), CheckpointError> {
        let bytes = self.snapshot(state)?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;

        tracing::debug!(path = %self.path.display(), pages = state.pages_fetched, "Checkpoint saved");
        Ok(())
    }

    /// Loads the checkpoint; `Ok(None)` when no file exists
    pub fn load(&self) -> Result<Option<SessionState>, CheckpointError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        let state = self.restore(&bytes)?;
        tracing::debug!(path = %self.path.display(), "Checkpoint loaded");
        Ok(Some(state))
    }

    /// Deletes the checkpoint file if present
    pub fn clear(&self) -> Result<(), CheckpointError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            tracing::debug!(path = %self.path.display(), "Checkpoint deleted");
        }
        Ok(())
    }

    /// Whether either cadence trigger has fired since the last save
    pub fn is_due(&self, pages_since: u64, elapsed: Duration) -> bool {
        let by_pages = self.every_pages > 0 && pages_since >= self.every_pages;
        let by_time = !self.interval.is_zero() && elapsed >= self.interval;
        by_pages || by_time
    }
}

fn checksum(value: &serde_json::Value) -> Result<String, CheckpointError> {
    let canonical = serde_json::to_vec(value).map_err(|e| CheckpointError::Corrupt(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}
