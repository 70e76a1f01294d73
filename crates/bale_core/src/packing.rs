//! Packing segments into pieces.
//!
//! Packing is best-fit decreasing over a fixed pool of pieces:
//!
//! 1. Every piece reserves room for the empty header segment
//! 2. Candidates are taken largest first (stable for equal sizes)
//! 3. Each goes to the open piece it fills most tightly, the lowest index
//!    winning ties; a new piece is opened only while fewer than `max_pieces`
//!    exist, otherwise the candidate is left over
//! 4. Each piece is finalized with its segments in ascending size order
//!    behind the header, and the aggregate commitment computed over them
//!
//! [`plan`] runs steps 1 to 3 on bare sizes. [`pack`] runs all four on
//! segments.

use crate::commitment::aggregate_commitment;
use crate::config::PackConfig;
use crate::error::CoreResult;
use crate::piece::{PaddedPieceSize, PieceInfo};
use crate::segment::{empty_header_segment, Segment};
use bale_codec::Cid;
use std::sync::Arc;
use tracing::debug;

/// Space every piece reserves for the empty header segment.
pub const HEADER_RESERVATION: u64 = PaddedPieceSize::MIN.get();

/// Placement of items by index, as computed by [`plan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Item indices per piece, in placement order.
    pub bins: Vec<Vec<usize>>,
    /// Indices of items that could not be placed, in consideration order.
    pub leftover: Vec<usize>,
}

/// Assigns items of the given sizes to at most `max_pieces` bins of
/// `capacity` bytes each, after reserving header space in every bin.
///
/// Sizes need not be powers of two.
#[must_use]
pub fn plan(sizes: &[u64], capacity: u64, max_pieces: usize) -> Plan {
    let usable = capacity.saturating_sub(HEADER_RESERVATION);

    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]));

    let mut plan = Plan::default();
    let mut remaining: Vec<u64> = Vec::new();

    for idx in order {
        let size = sizes[idx];
        if size > usable {
            plan.leftover.push(idx);
            continue;
        }

        let mut best: Option<(usize, u64)> = None;
        for (bin, &free) in remaining.iter().enumerate() {
            if free < size {
                continue;
            }
            let slack = free - size;
            if best.map_or(true, |(_, s)| slack < s) {
                best = Some((bin, slack));
            }
        }

        match best {
            Some((bin, slack)) => {
                remaining[bin] = slack;
                plan.bins[bin].push(idx);
            }
            None if plan.bins.len() < max_pieces => {
                remaining.push(usable - size);
                plan.bins.push(vec![idx]);
            }
            None => plan.leftover.push(idx),
        }
    }
    plan
}

/// A finalized aggregate of segments.
#[derive(Debug, Clone)]
pub struct Piece {
    /// Aggregate commitment and its padded size.
    pub info: PieceInfo,
    /// Capacity the piece was packed against.
    pub capacity: u64,
    /// Constituents in commitment order: the header segment, then the
    /// packed segments in ascending size.
    pub segments: Vec<Arc<Segment>>,
    /// Sum of constituent padded sizes, header included.
    pub used: u64,
    /// Sum of constituent encoded sizes, header included.
    pub total_segmented_size: u64,
}

impl Piece {
    /// The aggregate commitment CID.
    #[must_use]
    pub fn cid(&self) -> &Cid {
        &self.info.cid
    }

    /// The padded piece size.
    #[must_use]
    pub fn size(&self) -> PaddedPieceSize {
        self.info.size
    }

    /// Constituents other than the header.
    pub fn payload_segments(&self) -> impl Iterator<Item = &Arc<Segment>> {
        self.segments.iter().filter(|s| !s.is_header())
    }
}

/// Pieces produced by [`pack`], plus the segments that did not fit.
#[derive(Debug, Clone, Default)]
pub struct PackOutcome {
    /// Finalized pieces.
    pub pieces: Vec<Piece>,
    /// Segments that were not placed.
    pub leftover: Vec<Arc<Segment>>,
}

/// Packs `segments` into pieces according to `config`.
///
/// Deterministic for a given input order.
///
/// # Errors
///
/// Returns [`crate::CoreError::InvalidConfig`] if the capacity is not a
/// power of two larger than the header, and
/// [`crate::CoreError::InvalidPieceSize`] if a piece cannot be aggregated.
pub fn pack(segments: Vec<Arc<Segment>>, config: &PackConfig) -> CoreResult<PackOutcome> {
    config.validate()?;

    let sizes: Vec<u64> = segments.iter().map(|s| s.size().get()).collect();
    let placement = plan(&sizes, config.capacity, config.max_pieces);

    let mut outcome = PackOutcome {
        pieces: Vec::with_capacity(placement.bins.len()),
        leftover: placement
            .leftover
            .iter()
            .map(|&idx| Arc::clone(&segments[idx]))
            .collect(),
    };
    for bin in &placement.bins {
        let members = bin.iter().map(|&idx| Arc::clone(&segments[idx])).collect();
        outcome.pieces.push(finalize(members, config.capacity)?);
    }

    debug!(
        candidates = segments.len(),
        pieces = outcome.pieces.len(),
        leftover = outcome.leftover.len(),
        "packing complete"
    );
    Ok(outcome)
}

fn finalize(mut members: Vec<Arc<Segment>>, capacity: u64) -> CoreResult<Piece> {
    members.sort_by_key(|s| s.size());

    let mut ordered = Vec::with_capacity(members.len() + 1);
    ordered.push(empty_header_segment());
    ordered.extend(members);

    let used: u64 = ordered.iter().map(|s| s.size().get()).sum();
    let total_segmented_size = ordered.iter().map(|s| s.segmented_size).sum();
    let size = PaddedPieceSize::covering(used)?;

    let children: Vec<PieceInfo> = ordered.iter().map(|s| s.info.clone()).collect();
    let commitment = aggregate_commitment(&children, size)?;
    let info = PieceInfo {
        cid: Cid::piece_commitment(&commitment),
        size,
    };

    debug!(
        cid = %info.cid,
        size = size.get(),
        segments = ordered.len(),
        used,
        "piece finalized"
    );
    Ok(Piece {
        info,
        capacity,
        segments: ordered,
        used,
        total_segmented_size,
    })
}
