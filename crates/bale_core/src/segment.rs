//! Segments: immutable, commitment-addressed units of encoded data.

use crate::commitment::quad_commitment;
use crate::piece::{PaddedPieceSize, PieceInfo};
use bale_codec::archive::EMPTY_HEADER_V1;
use bale_codec::Cid;
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Locator of the built-in header segment, which has no backing blob.
pub const HEADER_LOCATOR: &str = "builtin:empty-header-v1";

/// A stored, archive-encoded unit of client data.
///
/// Never mutated after creation; shared as `Arc<Segment>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Commitment over the archive-encoded bytes and its padded size.
    pub info: PieceInfo,
    /// Length of the original input.
    pub raw_size: u64,
    /// Length of the archive encoding.
    pub segmented_size: u64,
    /// When the segment was created.
    pub created_at: SystemTime,
    /// Blob name in the backing store.
    pub locator: String,
}

impl Segment {
    /// The commitment CID.
    #[must_use]
    pub fn cid(&self) -> &Cid {
        &self.info.cid
    }

    /// The padded commitment size.
    #[must_use]
    pub fn size(&self) -> PaddedPieceSize {
        self.info.size
    }

    /// Whether this is the built-in empty header segment.
    #[must_use]
    pub fn is_header(&self) -> bool {
        self.locator == HEADER_LOCATOR
    }

    /// Blob name for a segment with the given commitment.
    #[must_use]
    pub fn locator_for(cid: &Cid) -> String {
        format!("{cid}.segment")
    }
}

/// The segment holding only [`EMPTY_HEADER_V1`], prepended to every piece.
///
/// Its commitment is over the 18 header bytes zero-padded to the minimum
/// payload, so its size is always 128.
pub fn empty_header_segment() -> Arc<Segment> {
    static HEADER: OnceLock<Arc<Segment>> = OnceLock::new();
    Arc::clone(HEADER.get_or_init(|| {
        Arc::new(Segment {
            info: PieceInfo {
                cid: Cid::piece_commitment(&quad_commitment(&EMPTY_HEADER_V1)),
                size: PaddedPieceSize::MIN,
            },
            raw_size: EMPTY_HEADER_V1.len() as u64,
            segmented_size: EMPTY_HEADER_V1.len() as u64,
            created_at: UNIX_EPOCH,
            locator: HEADER_LOCATOR.to_string(),
        })
    }))
}
