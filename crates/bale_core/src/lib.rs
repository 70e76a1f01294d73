//! # Bale Core
//!
//! Segmentation, piece commitments and piece packing.
//!
//! This crate provides:
//! - The streaming piece commitment calculator ([`CommitmentCalc`]) and
//!   aggregate commitments over child pieces ([`aggregate_commitment`])
//! - The [`Segmentor`] and [`Retriever`] capabilities, implemented by
//!   [`ArchiveSegmentor`] over any [`bale_storage::BlobStore`]
//! - Best-fit decreasing packing of segments into pieces ([`pack`], [`plan`])
//! - Shared plumbing: [`CancellationToken`] and the [`Lifecycle`] contract
//!
//! ## Usage
//!
//! ```
//! use bale_core::{ArchiveSegmentor, CancellationToken, PackConfig, Segmentor, SegmentorConfig};
//! use bale_storage::InMemoryStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let segmentor =
//!     ArchiveSegmentor::open(store, SegmentorConfig::default(), tracing::Span::none()).unwrap();
//!
//! let token = CancellationToken::new();
//! segmentor.segment(&mut &b"first"[..], &token).unwrap();
//! segmentor.segment(&mut &b"second"[..], &token).unwrap();
//!
//! let config = PackConfig::new().capacity(1024).max_pieces(1);
//! let outcome = bale_core::pack(segmentor.list_segments().unwrap(), &config).unwrap();
//! assert_eq!(outcome.pieces[0].segments.len(), 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod commitment;
mod config;
mod error;
mod lifecycle;
pub mod manifest;
pub mod packing;
mod piece;
mod segment;
pub mod segmentor;

pub use commitment::{
    aggregate_commitment, piece_commitment, zero_piece_commitment, Commitment, CommitmentCalc,
    MIN_PIECE_PAYLOAD,
};
pub use config::{PackConfig, SegmentorConfig};
pub use error::{CoreError, CoreResult};
pub use lifecycle::Lifecycle;
pub use packing::{pack, plan, PackOutcome, Piece, Plan};
pub use piece::{PaddedPieceSize, PieceInfo, GIB, KIB, MIB, MIN_PADDED_PIECE_SIZE};
pub use segment::{empty_header_segment, Segment, HEADER_LOCATOR};
pub use segmentor::{ArchiveSegmentor, Retriever, SegmentReport, Segmentor};
pub use tokio_util::sync::CancellationToken;
