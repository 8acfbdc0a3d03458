//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching behind the `Fetcher` seam
//! - HTML parsing and link extraction
//! - Per-domain politeness (robots.txt, spacing, concurrency caps)
//! - The worker pool and the coordinator that drives a session

mod context;
mod control;
mod coordinator;
mod fetcher;
mod parser;
mod politeness;
mod worker;

pub use context::CrawlContext;
pub use control::{ControlRequest, CrawlControl};
pub use coordinator::{Coordinator, CrawlReport};
pub use fetcher::{
    build_http_client, parse_retry_after, FetchError, FetchResponse, Fetcher, HttpFetcher,
    RenderHint, MAX_REDIRECTS,
};
pub use parser::{looks_client_rendered, looks_like_captcha, HtmlParser, PageMetadata, Parser};
pub use politeness::PolitenessPolicy;
pub use worker::{process, WorkerResult};

pub use crate::state::TerminationReason;

use crate::config::Config;
use crate::output::write_reports;
use crate::storage::{FrontierStore, SqliteFrontier};
use crate::Result;
use std::sync::Arc;

/// Session start options
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlOptions {
    /// Discard the frontier and checkpoint before starting
    pub restart: bool,
}

/// Runs a complete crawl session with the default adapters
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open (or create) the frontier database under the data root
/// 2. Build the HTTP fetcher
/// 3. Run the coordinator until the session terminates
/// 4. Write the summary and link-graph reports
///
/// A session ended by `control.stop()` returns `Ok` with
/// `TerminationReason::StopRequested`; rerunning resumes it.
pub async fn crawl(config: Config, options: CrawlOptions, control: &CrawlControl) -> Result<CrawlReport> {
    let reports_dir = config.output.reports_dir();
    let frontier: Arc<dyn FrontierStore> = Arc::new(SqliteFrontier::open(
        &config.output.database_path(),
        config.retry.clone(),
    )?);
    let fetcher = Arc::new(HttpFetcher::new(&config)?);

    let ctx = Arc::new(CrawlContext::new(config, frontier.clone(), fetcher));
    let report = Coordinator::new(ctx, control)
        .with_restart(options.restart)
        .run()
        .await?;

    write_reports(frontier.as_ref(), &report, &reports_dir)?;
    Ok(report)
}
