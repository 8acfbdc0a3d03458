//! Per-URL crawl log
//!
//! Every URL that reached a terminal status is written once, in discovery
//! order, to `crawled.csv` and `crawled.jsonl`. Both files carry the same
//! fields.

use crate::output::traits::OutputResult;
use crate::storage::UrlRecord;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const HEADER: &str = "url,parent_url,depth,status,http_status,content_type,size_bytes,fetch_ms,error";

/// One line of the crawl log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawledEntry<'a> {
    pub url: &'a str,
    pub parent_url: Option<&'a str>,
    pub depth: u32,
    pub status: &'static str,
    pub http_status: Option<u16>,
    pub content_type: Option<&'a str>,
    pub size_bytes: Option<u64>,
    pub fetch_ms: Option<u64>,
    pub error: Option<&'a str>,
}

impl<'a> CrawledEntry<'a> {
    pub fn from_record(record: &'a UrlRecord) -> Self {
        Self {
            url: &record.url,
            parent_url: record.parent_url.as_deref(),
            depth: record.depth,
            status: record.status.to_db_string(),
            http_status: record.http_status,
            content_type: record.content_type.as_deref(),
            size_bytes: record.body_bytes,
            fetch_ms: record.fetch_ms,
            error: record.failure_reason.as_deref(),
        }
    }
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn format_row(entry: &CrawledEntry<'_>) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{}",
        quote(entry.url),
        entry.parent_url.map(quote).unwrap_or_default(),
        entry.depth,
        entry.status,
        optional(entry.http_status),
        entry.content_type.map(quote).unwrap_or_default(),
        optional(entry.size_bytes),
        optional(entry.fetch_ms),
        entry.error.map(quote).unwrap_or_default(),
    )
}

fn terminal(records: &[UrlRecord]) -> impl Iterator<Item = CrawledEntry<'_>> {
    records
        .iter()
        .filter(|record| record.status.is_terminal())
        .map(CrawledEntry::from_record)
}

/// Formats the terminal records as CSV text
pub fn format_crawled_csv(records: &[UrlRecord]) -> String {
    let mut csv = String::from(HEADER);
    csv.push('\n');
    for entry in terminal(records) {
        csv.push_str(&format_row(&entry));
        csv.push('\n');
    }
    csv
}

/// Writes `crawled.csv` and `crawled.jsonl`, returning the number of entries
pub fn write_crawled(records: &[UrlRecord], csv_path: &Path, jsonl_path: &Path) -> OutputResult<u64> {
    let mut csv = BufWriter::new(File::create(csv_path)?);
    let mut jsonl = BufWriter::new(File::create(jsonl_path)?);
    writeln!(csv, "{}", HEADER)?;

    let mut written = 0;
    for entry in terminal(records) {
        writeln!(csv, "{}", format_row(&entry))?;
        serde_json::to_writer(&mut jsonl, &entry)?;
        jsonl.write_all(b"\n")?;
        written += 1;
    }
    csv.flush()?;
    jsonl.flush()?;
    Ok(written)
}
