/// URL status definitions for the frontier
///
/// Every URL record is in exactly one of these states.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current status of a URL in the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlStatus {
    // ===== Active States =====
    /// Known and waiting to be claimed
    Queued,

    /// Claimed by the coordinator under a lease
    InFlight,

    // ===== Terminal States =====
    /// Fetched and processed
    Done,

    /// Failed permanently or exhausted its retries
    Failed,

    /// Excluded by robots.txt; never fetched
    Skipped,
}

impl UrlStatus {
    /// Returns true if no further processing will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Skipped)
    }

    /// Returns true if the URL may still be fetched
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::InFlight)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "in_flight" => Some(Self::InFlight),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn all() -> [Self; 5] {
        [
            Self::Queued,
            Self::InFlight,
            Self::Done,
            Self::Failed,
            Self::Skipped,
        ]
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
