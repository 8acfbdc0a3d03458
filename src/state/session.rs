//! Session-level state owned by the coordinator
//!
//! `SessionState` holds the process-wide counters that the checkpoint
//! manager persists. `SessionPhase` is the coordinator's lifecycle.

use crate::storage::FrontierStats;
use crate::CrawlError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a crawl session
///
/// ```text
/// Idle -> Running <-> Paused
///            |          |
///            +-> Stopping <-+
///                  |
///               Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Running,
    Paused,
    Stopping,
    Stopped,
}

impl SessionPhase {
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Stopping)
                | (Paused, Stopping)
                | (Stopping, Stopped)
        )
    }

    /// Moves to `next`, rejecting transitions outside the lifecycle
    pub fn transition(self, next: SessionPhase) -> Result<SessionPhase, CrawlError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CrawlError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The page budget was spent
    BudgetExhausted,
    /// Queued URLs remain, but all of them lie beyond the depth limit
    DepthExhausted,
    /// Nothing left to fetch
    FrontierExhausted,
    /// An operator asked the crawl to stop
    StopRequested,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BudgetExhausted => "budget_exhausted",
            Self::DepthExhausted => "depth_exhausted",
            Self::FrontierExhausted => "frontier_exhausted",
            Self::StopRequested => "stop_requested",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "budget_exhausted" => Some(Self::BudgetExhausted),
            "depth_exhausted" => Some(Self::DepthExhausted),
            "frontier_exhausted" => Some(Self::FrontierExhausted),
            "stop_requested" => Some(Self::StopRequested),
            _ => None,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Process-wide crawl counters
///
/// Mutated only by the coordinator and persisted by the checkpoint manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Frontier session row this state belongs to
    pub session_id: i64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// URL records resolved Done (the budget counts these)
    pub pages_fetched: u64,
    /// URL records ever enqueued
    pub total_queued: u64,
    pub total_failed: u64,
    pub total_skipped: u64,
    pub retries_scheduled: u64,
    pub render_requeued: u64,
    pub max_depth_reached: u32,
    pub budget_remaining: u64,

    /// Milliseconds claimed records spent held behind politeness
    pub politeness_wait_ms: u64,

    pub links_discovered: u64,
    pub invalid_urls: u64,
    pub out_of_scope: u64,
    pub duplicate_links: u64,
    pub depth_limited: u64,
    pub non_html: u64,
    pub bytes_stored: u64,

    /// Highest discovery sequence handed out by a claim
    pub last_claimed_seq: i64,

    pub termination: Option<TerminationReason>,
}

impl SessionState {
    /// Zeroed counters for a fresh crawl with the given page budget
    pub fn new(max_pages: u64) -> Self {
        let now = Utc::now();
        Self {
            session_id: 0,
            started_at: now,
            updated_at: now,
            pages_fetched: 0,
            total_queued: 0,
            total_failed: 0,
            total_skipped: 0,
            retries_scheduled: 0,
            render_requeued: 0,
            max_depth_reached: 0,
            budget_remaining: max_pages,
            politeness_wait_ms: 0,
            links_discovered: 0,
            invalid_urls: 0,
            out_of_scope: 0,
            duplicate_links: 0,
            depth_limited: 0,
            non_html: 0,
            bytes_stored: 0,
            last_claimed_seq: 0,
            termination: None,
        }
    }

    /// Derives what it can from the frontier when no usable checkpoint exists
    pub fn from_stats(stats: &FrontierStats, max_pages: u64) -> Self {
        let mut state = Self::new(max_pages);
        state.reconcile(stats, max_pages);
        state
    }

    /// Overwrites the per-status counters with the frontier's authoritative values
    ///
    /// The frontier commits every completion while the checkpoint lags by up
    /// to one cadence, so the frontier wins wherever both hold a number.
    pub fn reconcile(&mut self, stats: &FrontierStats, max_pages: u64) {
        self.pages_fetched = stats.done;
        self.total_failed = stats.failed;
        self.total_skipped = stats.skipped;
        self.total_queued = stats.total;
        self.max_depth_reached = self.max_depth_reached.max(stats.max_done_depth);
        self.links_discovered = self.links_discovered.max(stats.links);
        self.refresh_budget(max_pages);
    }

    pub fn refresh_budget(&mut self, max_pages: u64) {
        self.budget_remaining = max_pages.saturating_sub(self.pages_fetched);
    }

    pub fn is_budget_exhausted(&self, max_pages: u64) -> bool {
        self.pages_fetched >= max_pages
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
