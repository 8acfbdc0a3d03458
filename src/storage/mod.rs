//! Storage module for persisting crawl data
//!
//! This module handles everything the crawler writes to disk:
//! - The durable URL frontier (SQLite), with claim leases and retry bookkeeping
//! - Link edges between pages
//! - Session rows for resumption
//! - The content-addressed HTML repository

mod content;
mod schema;
mod sqlite;
mod traits;

pub use content::{ContentError, ContentStore, FsContentStore, StoredContent};
pub use sqlite::SqliteFrontier;
pub use traits::{FrontierStore, StorageError, StorageResult};

use crate::state::UrlStatus;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// One normalized URL known to the frontier
#[derive(Debug, Clone, PartialEq)]
pub struct UrlRecord {
    /// Row id, doubling as the discovery sequence
    pub id: i64,
    pub url: String,
    pub domain: String,
    pub status: UrlStatus,
    pub depth: u32,
    /// Lower dispatches first; equal to depth
    pub priority: i64,
    pub parent_url: Option<String>,
    pub discovered_at: String,
    pub last_attempt_at: Option<String>,
    /// Milliseconds since the epoch before which the record is not claimable
    pub eligible_at: i64,
    pub retry_count: u32,
    /// Claim token; present only while InFlight
    pub lease: Option<i64>,
    pub needs_render: bool,
    pub http_status: Option<u16>,
    pub content_hash: Option<String>,
    pub content_type: Option<String>,
    pub title: Option<String>,
    pub language: Option<String>,
    pub failure_reason: Option<String>,
    pub final_url: Option<String>,
    pub finished_at: Option<String>,
    /// Duration of the successful fetch (milliseconds)
    pub fetch_ms: Option<u64>,
    /// Response body size as received, after the size cap
    pub body_bytes: Option<u64>,
}

/// A link between two pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub from_url: String,
    pub to_url: String,
    pub in_scope: bool,
}

/// A normalized link extracted from a page, ready for the frontier
#[derive(Debug, Clone)]
pub struct DiscoveredLink {
    pub url: Url,
    /// Edge flag recorded in the link graph
    pub in_scope: bool,
    /// Whether the link is enqueued (in scope and within the depth limit)
    pub follow: bool,
}

/// Result of enqueueing one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// First discovery; a Queued record was created
    Inserted,
    /// Already known; the stored record is left untouched
    Known { depth: u32 },
}

impl EnqueueOutcome {
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// Counts from one `enqueue_links` batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkBatch {
    pub inserted: u64,
    pub duplicates: u64,
    pub edges: u64,
}

/// Parameters for one `claim_next` call
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub limit: usize,
    pub max_depth: u32,
    /// Domains whose records are passed over (they already have held work)
    pub skip_domains: Vec<String>,
    pub now: chrono::DateTime<chrono::Utc>,
}

/// Category of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeouts, transport errors, 408/429/5xx; retried with backoff
    Transient,
    /// Any other HTTP error status
    Permanent,
    /// The content store failed twice
    Storage,
}

impl FailureKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub kind: FailureKind,
    pub reason: String,
    pub http_status: Option<u16>,
    pub retry_after: Option<Duration>,
}

impl Failure {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            reason: reason.into(),
            http_status: None,
            retry_after: None,
        }
    }

    pub fn permanent(reason: impl Into<String>, http_status: Option<u16>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            reason: reason.into(),
            http_status,
            retry_after: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    RobotsDisallowed,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RobotsDisallowed => "robots_disallowed",
        }
    }
}

/// What a successfully fetched page produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageOutcome {
    pub http_status: u16,
    pub final_url: String,
    pub content_type: Option<String>,
    pub content_hash: Option<String>,
    pub title: Option<String>,
    pub language: Option<String>,
    pub bytes_stored: u64,
    pub fetch_ms: u64,
    pub body_bytes: u64,
    pub non_html: bool,
    /// Raw hrefs, normalized later against `final_url`
    pub links: Vec<String>,
}

/// A worker's report for one claimed record
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done(PageOutcome),
    Failed(Failure),
    Skipped(SkipReason),
    /// The page must be fetched again through the renderer
    NeedsRender,
}

/// How `complete` resolved an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Done,
    Skipped,
    /// Requeued for another attempt
    Retry {
        retry_count: u32,
        eligible_at: i64,
    },
    /// Terminal failure
    Failed { retry_count: u32 },
    /// Requeued with the render flag set
    RenderRequeued,
    /// The lease no longer matched; nothing was written
    Stale,
}

/// Per-status counts over the frontier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrontierStats {
    pub queued: u64,
    pub in_flight: u64,
    pub done: u64,
    pub failed: u64,
    pub skipped: u64,
    pub total: u64,
    pub links: u64,
    pub max_done_depth: u32,
}

impl FrontierStats {
    /// Records that may still be fetched
    pub fn pending(&self) -> u64 {
        self.queued + self.in_flight
    }
}

/// Represents a crawl session
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: SessionStatus,
    pub termination_reason: Option<String>,
}

/// Status of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl SessionStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
