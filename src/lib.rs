//! Sumi-Crawl: a polite, resumable web crawler
//!
//! This crate implements the frontier and coordination engine of a concurrent
//! crawler: a durable SQLite frontier, per-domain politeness (robots.txt and
//! rate limits), a bounded worker pool and session checkpoints, plus default
//! adapters for HTTP fetching, HTML parsing, content storage and reports.

pub mod checkpoint;
pub mod config;
pub mod crawler;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Crawl operations
///
/// Per-URL failures never surface here; they are recorded as outcomes in the
/// frontier. Anything that does reach this type ends the crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Frontier store failure (crawl state can no longer be persisted): {0}")]
    Frontier(#[from] storage::StorageError),

    #[error("Content store error: {0}")]
    Content(#[from] storage::ContentError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] checkpoint::CheckpointError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid session transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::SessionPhase,
        to: state::SessionPhase,
    },

    #[error("No valid seed URLs to crawl")]
    NoSeeds,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("URL exceeds maximum length of {max} ({len} characters)")]
    TooLong { len: usize, max: usize },

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sumi-Crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{crawl, CrawlControl, CrawlOptions, CrawlReport, Coordinator, TerminationReason};
pub use state::{SessionPhase, SessionState, UrlStatus};
pub use url::{domain_key, normalize, CrawlScope};
