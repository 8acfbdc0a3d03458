//! State module for tracking crawl progress
//!
//! This module provides the state types shared by the frontier, the
//! politeness policy and the coordinator.
//!
//! # Components
//!
//! - `UrlStatus`: The status of an individual URL record (queued, in flight, done, ...)
//! - `DomainState`: Per-domain dispatch state for rate limiting and concurrency caps
//! - `SessionState`: Process-wide counters persisted by checkpoints
//! - `SessionPhase`: The coordinator lifecycle

mod domain_state;
mod session;
mod url_status;

// Re-export main types
pub use domain_state::{instant_after, DomainState, Reservation, WaitReason, FAR_FUTURE};
pub use session::{SessionPhase, SessionState, TerminationReason};
pub use url_status::UrlStatus;
