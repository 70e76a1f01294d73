//! List command implementation.

use super::{open_store, print_json, SegmentRow};
use crate::error::CliResult;
use crate::Format;
use bale_core::{Segmentor, SegmentorConfig};
use std::path::Path;

/// Runs the list command.
pub fn run(path: &Path, format: Format) -> CliResult<()> {
    let segmentor = open_store(path, SegmentorConfig::default(), false)?;
    let rows: Vec<SegmentRow> = segmentor
        .list_segments()?
        .iter()
        .map(|s| SegmentRow::from(s.as_ref()))
        .collect();

    match format {
        Format::Json => print_json(&rows)?,
        Format::Text => {
            rows.iter().for_each(SegmentRow::print);
            let raw: u64 = rows.iter().map(|r| r.raw_size).sum();
            println!("{} segments, {raw} bytes", rows.len());
        }
    }
    Ok(())
}
