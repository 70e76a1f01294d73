//! Error types for Bale core.

use bale_codec::Cid;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in segmentation, commitment and packing.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Blob store error.
    #[error("storage error: {0}")]
    Storage(#[from] bale_storage::StorageError),

    /// Encoding or decoding error.
    #[error("codec error: {0}")]
    Codec(#[from] bale_codec::CodecError),

    /// I/O error while reading input.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Input exceeded the configured maximum segment size.
    #[error("segment too large: read {read} bytes, maximum is {max}")]
    SegmentTooLarge {
        /// Raw bytes read before giving up.
        read: u64,
        /// Configured maximum.
        max: u64,
    },

    /// No segment is registered under the commitment.
    #[error("segment not found: {0}")]
    SegmentNotFound(Cid),

    /// A segment with identical content is already stored.
    #[error("segment already exists: {0}")]
    DuplicateSegment(Cid),

    /// `digest` was called twice without `reset`.
    #[error("commitment digest already taken; reset before reuse")]
    DigestConsumed,

    /// A size is not a valid padded piece size.
    #[error("invalid piece size: {message}")]
    InvalidPieceSize {
        /// Description of the problem.
        message: String,
    },

    /// Configuration values are inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Stored bytes no longer match their commitment.
    #[error("checksum mismatch for {cid}: recomputed {actual}")]
    ChecksumMismatch {
        /// Commitment the segment is registered under.
        cid: Cid,
        /// Commitment recomputed from the stored bytes.
        actual: Cid,
    },

    /// A segment archive could not be parsed.
    #[error("corrupt section in {cid} at offset {offset}: {source}")]
    CorruptSection {
        /// Segment being read.
        cid: Cid,
        /// Byte offset of the bad section.
        offset: u64,
        /// Underlying parse failure.
        source: bale_codec::CodecError,
    },

    /// The segment manifest could not be decoded.
    #[error("invalid manifest: {message}")]
    InvalidManifest {
        /// Description of the problem.
        message: String,
    },

    /// The operation observed cancellation.
    #[error("operation cancelled")]
    Cancelled,
}

impl CoreError {
    /// Creates an invalid piece size error.
    pub fn invalid_piece_size(message: impl Into<String>) -> Self {
        Self::InvalidPieceSize {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid manifest error.
    pub fn invalid_manifest(message: impl Into<String>) -> Self {
        Self::InvalidManifest {
            message: message.into(),
        }
    }

    /// Returns true if this error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true if this error means the segment is unknown.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SegmentNotFound(_))
            || matches!(self, Self::Storage(e) if e.is_not_found())
    }
}
