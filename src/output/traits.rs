//! Output error and summary types
//!
//! A `CrawlSummary` is assembled from the frontier (and the session report
//! when one is available) and rendered as JSON and markdown.

use crate::state::SessionState;
use crate::storage::StorageError;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// A URL that ended Failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureEntry {
    pub url: String,
    pub http_status: Option<u16>,
    pub reason: Option<String>,
    pub retries: u32,
}

/// Fetch duration of one Done page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchTiming {
    pub url: String,
    pub ms: u64,
}

/// Summary statistics for a crawl
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlSummary {
    // Session metadata
    pub session_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub elapsed_secs: Option<f64>,
    pub status: String,
    pub termination: Option<String>,
    pub config_hash: String,
    pub sessions: u64,

    // Frontier breakdown
    pub total_urls: u64,
    pub queued: u64,
    pub in_flight: u64,
    pub done: u64,
    pub failed: u64,
    pub skipped: u64,
    pub total_links: u64,
    pub unique_domains: u64,

    /// Done pages per depth
    pub depth_breakdown: BTreeMap<u32, u64>,

    /// Domains with the most Done pages, descending
    pub top_domains: Vec<(String, u64)>,

    /// Terminal failures in discovery order
    pub failures: Vec<FailureEntry>,

    // Throughput over Done pages
    /// Body bytes received
    pub total_bytes: u64,
    pub fastest_fetch: Option<FetchTiming>,
    pub slowest_fetch: Option<FetchTiming>,
    /// Pages fetched by this session per wall-clock second
    pub pages_per_sec: Option<f64>,

    /// Coordinator counters, when the summary follows a session
    pub counters: Option<SessionState>,
}

impl CrawlSummary {
    /// Creates a new empty crawl summary
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs that reached Done, Failed or Skipped
    pub fn total_terminal(&self) -> u64 {
        self.done + self.failed + self.skipped
    }

    /// Returns the success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let terminal = self.total_terminal();
        if terminal == 0 {
            return 0.0;
        }
        (self.done as f64 / terminal as f64) * 100.0
    }

    /// Returns the error rate as a percentage
    pub fn error_rate(&self) -> f64 {
        let terminal = self.total_terminal();
        if terminal == 0 {
            return 0.0;
        }
        (self.failed as f64 / terminal as f64) * 100.0
    }
}
