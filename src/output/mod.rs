//! Output module for generating crawl summaries and reports
//!
//! This module handles:
//! - Building a summary from the frontier and the session report
//! - Writing it as `summary.json` and `summary.md`
//! - Exporting the link graph as `graph_edges.csv`
//! - Logging every finished URL to `crawled.csv` and `crawled.jsonl`
//! - Printing statistics for an existing crawl database
//!
//! Reporting only reads the frontier.

mod graph;
mod json;
mod markdown;
mod records;
pub mod stats;
mod traits;

pub use graph::{format_graph_csv, write_graph_edges};
pub use json::write_json_summary;
pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use records::{format_crawled_csv, write_crawled, CrawledEntry};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use traits::{CrawlSummary, FailureEntry, FetchTiming, OutputError, OutputResult};

use crate::crawler::CrawlReport;
use crate::state::UrlStatus;
use crate::storage::FrontierStore;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Domains listed in the summary
const TOP_DOMAINS: usize = 20;

/// Failures listed in the summary
const MAX_FAILURES: usize = 50;

/// Files written by `write_reports`
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
    pub graph: PathBuf,
    pub crawled_csv: PathBuf,
    pub crawled_jsonl: PathBuf,
}

/// Generates a crawl summary from the frontier
///
/// Session metadata comes from the latest session row; the coordinator's
/// counters are attached when a report is given.
pub fn generate_summary(
    frontier: &dyn FrontierStore,
    report: Option<&CrawlReport>,
) -> OutputResult<CrawlSummary> {
    let stats = frontier.stats()?;
    let sessions = frontier.sessions()?;
    let records = frontier.records()?;

    let mut summary = CrawlSummary {
        sessions: sessions.len() as u64,
        total_urls: stats.total,
        queued: stats.queued,
        in_flight: stats.in_flight,
        done: stats.done,
        failed: stats.failed,
        skipped: stats.skipped,
        total_links: stats.links,
        ..CrawlSummary::default()
    };

    if let Some(session) = sessions.last() {
        summary.session_id = session.id;
        summary.started_at = session.started_at.clone();
        summary.finished_at = session.finished_at.clone();
        summary.status = session.status.to_db_string().to_string();
        summary.termination = session.termination_reason.clone();
        summary.config_hash = session.config_hash.clone();
    }

    if let Some(report) = report {
        summary.elapsed_secs = Some(report.elapsed_secs);
        summary.termination = Some(report.termination.as_str().to_string());
        summary.counters = Some(report.session.clone());
        if report.elapsed_secs > 0.0 {
            summary.pages_per_sec = Some(report.session.pages_fetched as f64 / report.elapsed_secs);
        }
    }

    let mut domains = HashSet::new();
    let mut done_per_domain: HashMap<&str, u64> = HashMap::new();
    let mut depth_breakdown = BTreeMap::new();
    for record in &records {
        domains.insert(record.domain.as_str());
        match record.status {
            UrlStatus::Done => {
                *done_per_domain.entry(record.domain.as_str()).or_insert(0) += 1;
                *depth_breakdown.entry(record.depth).or_insert(0) += 1;
                summary.total_bytes += record.body_bytes.unwrap_or(0);
                if let Some(ms) = record.fetch_ms {
                    track_timing(&mut summary, &record.url, ms);
                }
            }
            UrlStatus::Failed if summary.failures.len() < MAX_FAILURES => {
                summary.failures.push(FailureEntry {
                    url: record.url.clone(),
                    http_status: record.http_status,
                    reason: record.failure_reason.clone(),
                    retries: record.retry_count,
                });
            }
            _ => {}
        }
    }

    let mut top_domains: Vec<(String, u64)> = done_per_domain
        .into_iter()
        .map(|(domain, count)| (domain.to_string(), count))
        .collect();
    top_domains.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_domains.truncate(TOP_DOMAINS);

    summary.unique_domains = domains.len() as u64;
    summary.depth_breakdown = depth_breakdown;
    summary.top_domains = top_domains;
    Ok(summary)
}

fn track_timing(summary: &mut CrawlSummary, url: &str, ms: u64) {
    let timing = || FetchTiming {
        url: url.to_string(),
        ms,
    };
    if summary.fastest_fetch.as_ref().map_or(true, |fastest| ms < fastest.ms) {
        summary.fastest_fetch = Some(timing());
    }
    if summary.slowest_fetch.as_ref().map_or(true, |slowest| ms > slowest.ms) {
        summary.slowest_fetch = Some(timing());
    }
}

/// Writes every report for a finished session into `dir`
pub fn write_reports(
    frontier: &dyn FrontierStore,
    report: &CrawlReport,
    dir: &Path,
) -> OutputResult<ReportPaths> {
    std::fs::create_dir_all(dir)?;
    let summary = generate_summary(frontier, Some(report))?;

    let paths = ReportPaths {
        json: dir.join("summary.json"),
        markdown: dir.join("summary.md"),
        graph: dir.join("graph_edges.csv"),
        crawled_csv: dir.join("crawled.csv"),
        crawled_jsonl: dir.join("crawled.jsonl"),
    };
    write_json_summary(&summary, &paths.json)?;
    generate_markdown_summary(&summary, &paths.markdown)?;
    let edges = write_graph_edges(&frontier.links()?, &paths.graph)?;
    let crawled = write_crawled(&frontier.records()?, &paths.crawled_csv, &paths.crawled_jsonl)?;

    tracing::info!(dir = %dir.display(), edges, crawled, "Reports written");
    Ok(paths)
}
