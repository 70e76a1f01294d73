//! Pack command implementation.
//!
//! A dry run: pieces are computed and printed, nothing is stored.

use super::{open_store, print_json};
use crate::error::CliResult;
use crate::Format;
use bale_core::{pack, PackConfig, PackOutcome, Segmentor, SegmentorConfig};
use serde::Serialize;
use std::path::Path;

/// Pack result.
#[derive(Debug, Serialize)]
pub struct PackResult {
    /// Capacity packed against.
    pub capacity: u64,
    /// Pieces that would be built.
    pub pieces: Vec<PieceSummary>,
    /// Segments left for a later pass.
    pub leftover: Vec<String>,
}

/// One piece of the plan.
#[derive(Debug, Serialize)]
pub struct PieceSummary {
    /// Aggregate commitment CID.
    pub cid: String,
    /// Padded piece size.
    pub size: u64,
    /// Padded bytes used, header included.
    pub used: u64,
    /// Archive bytes across all segments.
    pub segmented_size: u64,
    /// Constituent segment CIDs, header first.
    pub segments: Vec<String>,
}

impl From<&PackOutcome> for PackResult {
    fn from(outcome: &PackOutcome) -> Self {
        Self {
            capacity: outcome.pieces.first().map_or(0, |p| p.capacity),
            pieces: outcome
                .pieces
                .iter()
                .map(|piece| PieceSummary {
                    cid: piece.cid().to_string(),
                    size: piece.size().get(),
                    used: piece.used,
                    segmented_size: piece.total_segmented_size,
                    segments: piece.segments.iter().map(|s| s.cid().to_string()).collect(),
                })
                .collect(),
            leftover: outcome.leftover.iter().map(|s| s.cid().to_string()).collect(),
        }
    }
}

/// Runs the pack command.
pub fn run(path: &Path, capacity: u64, max_pieces: usize, format: Format) -> CliResult<()> {
    let segmentor = open_store(path, SegmentorConfig::default(), false)?;
    let config = PackConfig::new().capacity(capacity).max_pieces(max_pieces);
    let outcome = pack(segmentor.list_segments()?, &config)?;
    let mut result = PackResult::from(&outcome);
    result.capacity = capacity;

    match format {
        Format::Json => print_json(&result)?,
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &PackResult) {
    for piece in &result.pieces {
        println!("Piece {}", piece.cid);
        println!(
            "  size={} used={} segmented={}",
            piece.size, piece.used, piece.segmented_size
        );
        for segment in &piece.segments {
            println!("  - {segment}");
        }
    }
    if !result.leftover.is_empty() {
        println!("Leftover ({}):", result.leftover.len());
        for cid in &result.leftover {
            println!("  - {cid}");
        }
    }
    println!(
        "{} pieces, {} leftover, capacity {}",
        result.pieces.len(),
        result.leftover.len(),
        result.capacity
    );
}
