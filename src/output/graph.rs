//! Link graph export
//!
//! One CSV row per recorded edge: `source,target,in_scope`. URLs are always
//! quoted since they may contain commas.

use crate::output::traits::OutputResult;
use crate::storage::LinkRecord;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const HEADER: &str = "source,target,in_scope";

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn format_row(link: &LinkRecord) -> String {
    format!(
        "{},{},{}",
        quote(&link.from_url),
        quote(&link.to_url),
        link.in_scope
    )
}

/// Formats edges as CSV text
pub fn format_graph_csv(links: &[LinkRecord]) -> String {
    let mut csv = String::with_capacity(HEADER.len() + 1 + links.len() * 64);
    csv.push_str(HEADER);
    csv.push('\n');
    for link in links {
        csv.push_str(&format_row(link));
        csv.push('\n');
    }
    csv
}

/// Writes edges to `output_path`, returning the number of rows
pub fn write_graph_edges(links: &[LinkRecord], output_path: &Path) -> OutputResult<u64> {
    let mut writer = BufWriter::new(File::create(output_path)?);
    writeln!(writer, "{}", HEADER)?;
    for link in links {
        writeln!(writer, "{}", format_row(link))?;
    }
    writer.flush()?;
    Ok(links.len() as u64)
}
