//! Markdown summary generation
//!
//! This module generates human-readable markdown summaries of crawl results,
//! including statistics, failures, and the most crawled domains.

use crate::output::traits::{CrawlSummary, OutputResult};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Generates a markdown summary from crawl statistics
///
/// # Arguments
///
/// * `summary` - The crawl summary data
/// * `output_path` - Path where the markdown file should be written
pub fn generate_markdown_summary(summary: &CrawlSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl summary as markdown
pub fn format_markdown_summary(summary: &CrawlSummary) -> String {
    let mut md = String::new();

    md.push_str("# Sumi-Crawl Summary\n\n");

    // Session metadata
    md.push_str("## Session Information\n\n");
    md.push_str(&format!("- **Session ID**: {}\n", summary.session_id));
    md.push_str(&format!("- **Sessions so far**: {}\n", summary.sessions));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at));
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    if let Some(elapsed) = summary.elapsed_secs {
        md.push_str(&format!(
            "- **Duration**: {:.1} seconds ({:.2} minutes)\n",
            elapsed,
            elapsed / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", summary.status));
    if let Some(termination) = &summary.termination {
        md.push_str(&format!("- **Termination**: {}\n", termination));
    }
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    // Overall statistics
    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Known URLs**: {}\n", summary.total_urls));
    md.push_str(&format!("- **Unique Domains**: {}\n", summary.unique_domains));
    md.push_str(&format!("- **Link Edges**: {}\n", summary.total_links));
    md.push_str(&format!("- **Success Rate**: {:.2}%\n", summary.success_rate()));
    md.push_str(&format!("- **Error Rate**: {:.2}%\n\n", summary.error_rate()));

    // Status breakdown
    md.push_str("## URL Status Breakdown\n\n");
    md.push_str("| Status | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Done | {} |\n", summary.done));
    md.push_str(&format!("| Failed | {} |\n", summary.failed));
    md.push_str(&format!("| Skipped | {} |\n", summary.skipped));
    md.push_str(&format!("| Queued | {} |\n", summary.queued));
    md.push_str(&format!("| In Flight | {} |\n\n", summary.in_flight));

    if summary.fastest_fetch.is_some() || summary.pages_per_sec.is_some() {
        md.push_str("## Throughput\n\n");
        md.push_str(&format!("- **Bytes Received**: {}\n", summary.total_bytes));
        if let Some(rate) = summary.pages_per_sec {
            md.push_str(&format!("- **Pages/sec**: {:.2}\n", rate));
        }
        if let Some(fastest) = &summary.fastest_fetch {
            md.push_str(&format!("- **Fastest Fetch**: {} ms ({})\n", fastest.ms, fastest.url));
        }
        if let Some(slowest) = &summary.slowest_fetch {
            md.push_str(&format!("- **Slowest Fetch**: {} ms ({})\n", slowest.ms, slowest.url));
        }
        md.push('\n');
    }

    if let Some(counters) = &summary.counters {
        md.push_str("## Session Counters\n\n");
        md.push_str("| Counter | Value |\n");
        md.push_str("|---------|-------|\n");
        let rows = [
            ("Pages fetched", counters.pages_fetched),
            ("Retries scheduled", counters.retries_scheduled),
            ("Render re-queues", counters.render_requeued),
            ("Links discovered", counters.links_discovered),
            ("Invalid URLs", counters.invalid_urls),
            ("Out of scope", counters.out_of_scope),
            ("Duplicate links", counters.duplicate_links),
            ("Depth limited", counters.depth_limited),
            ("Non-HTML", counters.non_html),
            ("Bytes stored", counters.bytes_stored),
            ("Politeness wait (ms)", counters.politeness_wait_ms),
        ];
        for (name, value) in rows {
            md.push_str(&format!("| {} | {} |\n", name, value));
        }
        md.push('\n');
    }

    // Depth breakdown
    if !summary.depth_breakdown.is_empty() {
        md.push_str("## Depth Breakdown\n\n");
        md.push_str("| Depth | Pages |\n");
        md.push_str("|-------|-------|\n");
        for (depth, count) in &summary.depth_breakdown {
            md.push_str(&format!("| {} | {} |\n", depth, count));
        }
        md.push('\n');
    }

    if !summary.top_domains.is_empty() {
        md.push_str(&format!("## Top {} Domains\n\n", summary.top_domains.len()));
        md.push_str("| Domain | Pages |\n");
        md.push_str("|--------|-------|\n");
        for (domain, count) in &summary.top_domains {
            md.push_str(&format!("| {} | {} |\n", domain, count));
        }
        md.push('\n');
    }

    if !summary.failures.is_empty() {
        md.push_str("## Failures\n\n");
        md.push_str("| URL | Status | Retries | Reason |\n");
        md.push_str("|-----|--------|---------|--------|\n");
        for failure in &summary.failures {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                failure.url,
                failure
                    .http_status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                failure.retries,
                failure.reason.as_deref().unwrap_or("-")
            ));
        }
        if summary.failed > summary.failures.len() as u64 {
            md.push_str(&format!(
                "\n... and {} more\n",
                summary.failed - summary.failures.len() as u64
            ));
        }
        md.push('\n');
    }

    md
}
