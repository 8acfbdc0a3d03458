//! Frontier store trait and error types
//!
//! The coordinator talks to the frontier only through `FrontierStore`. Every
//! mutating operation is atomic and durable before it returns.

use crate::state::TerminationReason;
use crate::storage::{
    ClaimRequest, DiscoveredLink, EnqueueOutcome, FrontierStats, LinkBatch, LinkRecord, Outcome,
    Resolution, SessionRecord, SessionStatus, UrlRecord,
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

/// Errors that can occur during frontier operations
///
/// Any of these ends the crawl: the frontier is the source of truth and a
/// crawl that cannot record its progress cannot continue safely.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Frontier connection lock poisoned")]
    LockPoisoned,

    #[error("Corrupt frontier data: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable, crash-consistent record of every known URL
pub trait FrontierStore: Send + Sync {
    // ===== Discovery =====

    /// Inserts a Queued record if the URL is unseen
    ///
    /// The first discovery fixes depth and parent; a rediscovery at any
    /// depth returns `Known` and writes nothing.
    fn enqueue(&self, url: &Url, parent: Option<&str>, depth: u32)
        -> StorageResult<EnqueueOutcome>;

    /// Records every edge from `parent` and enqueues the followed links at `depth`, in one transaction
    fn enqueue_links(
        &self,
        parent: &str,
        depth: u32,
        links: &[DiscoveredLink],
    ) -> StorageResult<LinkBatch>;

    // ===== Claim / complete =====

    /// Moves up to `limit` eligible Queued records to InFlight, each with a fresh lease
    ///
    /// Order is ascending priority, then ascending discovery sequence.
    fn claim_next(&self, request: &ClaimRequest) -> StorageResult<Vec<UrlRecord>>;

    /// Applies a worker outcome to a claimed record
    ///
    /// Returns `Resolution::Stale` without writing when the record is no
    /// longer InFlight under the record's lease.
    fn complete(
        &self,
        record: &UrlRecord,
        outcome: &Outcome,
        now: DateTime<Utc>,
    ) -> StorageResult<Resolution>;

    /// Hands back a claim that was never dispatched, without a retry charge
    fn release(&self, record: &UrlRecord) -> StorageResult<bool>;

    /// Sweeps every InFlight record back to Queued; run before the first claim
    fn recover_in_flight(&self) -> StorageResult<u64>;

    // ===== Queries =====

    fn stats(&self) -> StorageResult<FrontierStats>;

    /// Earliest eligibility among Queued records within `max_depth`
    fn next_eligible_at(&self, max_depth: u32) -> StorageResult<Option<DateTime<Utc>>>;

    /// Number of Queued records deeper than `max_depth`
    fn queued_beyond_depth(&self, max_depth: u32) -> StorageResult<u64>;

    fn get(&self, url: &str) -> StorageResult<Option<UrlRecord>>;

    /// All link edges in insertion order
    fn links(&self) -> StorageResult<Vec<LinkRecord>>;

    /// All URL records in discovery order
    fn records(&self) -> StorageResult<Vec<UrlRecord>>;

    // ===== Sessions =====

    fn begin_session(&self, config_hash: &str) -> StorageResult<i64>;

    fn finish_session(
        &self,
        id: i64,
        status: SessionStatus,
        reason: Option<TerminationReason>,
    ) -> StorageResult<()>;

    fn sessions(&self) -> StorageResult<Vec<SessionRecord>>;

    /// Deletes every record, edge and session
    fn reset(&self) -> StorageResult<()>;
}
