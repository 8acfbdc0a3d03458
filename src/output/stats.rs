//! Statistics generation from the frontier database
//!
//! Backs the `--stats` flag: reads an existing frontier without crawling.

use crate::output::OutputResult;
use crate::state::UrlStatus;
use crate::storage::{FrontierStats, FrontierStore, SessionRecord};
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    pub frontier: FrontierStats,

    /// Count of URLs by status
    pub urls_by_status: HashMap<UrlStatus, u64>,

    /// Number of unique domain keys encountered
    pub unique_domains: u64,

    /// Failed URLs per failure reason
    pub failure_reasons: HashMap<String, u64>,

    /// URLs waiting for the renderer
    pub awaiting_render: u64,

    pub sessions: Vec<SessionRecord>,
}

/// Loads statistics from the frontier
pub fn load_statistics(frontier: &dyn FrontierStore) -> OutputResult<CrawlStatistics> {
    let stats = frontier.stats()?;
    let records = frontier.records()?;

    let mut urls_by_status = HashMap::new();
    let mut domains = std::collections::HashSet::new();
    let mut failure_reasons = HashMap::new();
    let mut awaiting_render = 0;

    for record in &records {
        *urls_by_status.entry(record.status).or_insert(0) += 1;
        domains.insert(record.domain.as_str());
        if record.status == UrlStatus::Failed {
            let reason = record
                .failure_reason
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            *failure_reasons.entry(reason).or_insert(0) += 1;
        }
        if record.status == UrlStatus::Queued && record.needs_render {
            awaiting_render += 1;
        }
    }

    Ok(CrawlStatistics {
        frontier: stats,
        urls_by_status,
        unique_domains: domains.len() as u64,
        failure_reasons,
        awaiting_render,
        sessions: frontier.sessions()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    let total = stats.frontier.total;
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Known URLs: {}", total);
    println!("  Unique domains: {}", stats.unique_domains);
    println!("  Link edges: {}", stats.frontier.links);
    println!("  Deepest completed page: {}", stats.frontier.max_done_depth);
    println!();

    println!("URLs by Status:");
    for status in UrlStatus::all() {
        let count = stats.urls_by_status.get(&status).copied().unwrap_or(0);
        let percentage = if total > 0 {
            (count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    if stats.awaiting_render > 0 {
        println!("  (of the queued, {} await rendering)", stats.awaiting_render);
    }
    println!();

    if !stats.failure_reasons.is_empty() {
        println!("Failure Reasons:");
        let mut reasons: Vec<_> = stats.failure_reasons.iter().collect();
        reasons.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (reason, count) in reasons {
            println!("  {}: {}", reason, count);
        }
        println!();
    }

    if !stats.sessions.is_empty() {
        println!("Sessions ({}):", stats.sessions.len());
        for session in &stats.sessions {
            println!(
                "  #{} {} started {} {}",
                session.id,
                session.status.to_db_string(),
                session.started_at,
                session.termination_reason.as_deref().unwrap_or("-")
            );
        }
        println!();
    }
}
