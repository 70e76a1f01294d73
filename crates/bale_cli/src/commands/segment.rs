//! Segment command implementation.

use super::{open_store, print_json, SegmentRow};
use crate::error::CliResult;
use crate::Format;
use bale_core::{CancellationToken, Segmentor, SegmentorConfig};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::info;

/// Runs the segment command.
pub fn run(
    path: &Path,
    files: &[PathBuf],
    chunk_size: usize,
    max_segment_size: Option<u64>,
    format: Format,
) -> CliResult<()> {
    let mut config = SegmentorConfig::new().chunk_size(chunk_size);
    if let Some(max) = max_segment_size {
        config = config.max_segment_size(max);
    }
    let segmentor = open_store(path, config, true)?;
    let token = CancellationToken::new();

    let mut rows = Vec::with_capacity(files.len());
    for file in files {
        let mut input: Box<dyn Read> = if file.as_os_str() == "-" {
            Box::new(io::stdin().lock())
        } else {
            Box::new(BufReader::new(File::open(file)?))
        };
        let segment = segmentor.segment(&mut input, &token)?;
        info!(file = %file.display(), cid = %segment.cid(), "segmented");
        rows.push(SegmentRow::from(segment.as_ref()));
    }

    match format {
        Format::Json => print_json(&rows)?,
        Format::Text => rows.iter().for_each(SegmentRow::print),
    }
    Ok(())
}
