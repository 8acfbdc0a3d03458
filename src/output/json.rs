//! JSON summary writer

use crate::output::traits::{CrawlSummary, OutputResult};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes the summary as pretty-printed JSON
pub fn write_json_summary(summary: &CrawlSummary, output_path: &Path) -> OutputResult<()> {
    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
