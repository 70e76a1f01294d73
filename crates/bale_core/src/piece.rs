//! Piece sizes and identities.

use crate::error::{CoreError, CoreResult};
use bale_codec::Cid;
use std::fmt;

/// One kibibyte.
pub const KIB: u64 = 1024;
/// One mebibyte.
pub const MIB: u64 = 1024 * KIB;
/// One gibibyte.
pub const GIB: u64 = 1024 * MIB;

/// Smallest padded piece size.
pub const MIN_PADDED_PIECE_SIZE: u64 = 128;

/// A piece size after Fr32 padding: a power of two, at least 128 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PaddedPieceSize(u64);

impl PaddedPieceSize {
    /// The smallest piece size.
    pub const MIN: Self = Self(MIN_PADDED_PIECE_SIZE);

    /// Validates and wraps a padded size.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPieceSize`] unless `size` is a power of
    /// two no smaller than 128.
    pub fn new(size: u64) -> CoreResult<Self> {
        if size < MIN_PADDED_PIECE_SIZE || !size.is_power_of_two() {
            return Err(CoreError::invalid_piece_size(format!(
                "{size} is not a power of two of at least {MIN_PADDED_PIECE_SIZE}"
            )));
        }
        Ok(Self(size))
    }

    /// Smallest padded size that holds `bytes` bytes of padded content.
    ///
    /// # Errors
    ///
    /// Fails if no `u64` power of two is large enough.
    pub fn covering(bytes: u64) -> CoreResult<Self> {
        bytes
            .max(MIN_PADDED_PIECE_SIZE)
            .checked_next_power_of_two()
            .map(Self)
            .ok_or_else(|| CoreError::invalid_piece_size(format!("{bytes} is too large")))
    }

    /// Size in bytes.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Payload bytes this size holds before Fr32 padding.
    #[must_use]
    pub const fn unpadded(self) -> u64 {
        self.0 - self.0 / 128
    }

    /// Number of 32-byte leaves in a tree of this size.
    #[must_use]
    pub const fn leaves(self) -> u64 {
        self.0 / 32
    }

    /// Height of the commitment tree above the leaves.
    #[must_use]
    pub const fn tree_height(self) -> u32 {
        self.leaves().trailing_zeros()
    }
}

impl fmt::Display for PaddedPieceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A piece commitment together with its padded size.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PieceInfo {
    /// Commitment CID (`fil-commitment-unsealed`).
    pub cid: Cid,
    /// Padded size.
    pub size: PaddedPieceSize,
}

impl PieceInfo {
    /// Raw commitment bytes.
    ///
    /// # Errors
    ///
    /// Fails if the CID is not a piece commitment.
    pub fn commitment(&self) -> CoreResult<[u8; 32]> {
        self.cid.as_piece_commitment().ok_or_else(|| {
            CoreError::invalid_piece_size(format!("{} is not a piece commitment", self.cid))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation() {
        assert!(PaddedPieceSize::new(128).is_ok());
        assert!(PaddedPieceSize::new(32 * GIB).is_ok());
        assert!(PaddedPieceSize::new(64).is_err());
        assert!(PaddedPieceSize::new(384).is_err());
        assert!(PaddedPieceSize::new(0).is_err());
    }

    #[test]
    fn covering() {
        assert_eq!(PaddedPieceSize::covering(0).unwrap().get(), 128);
        assert_eq!(PaddedPieceSize::covering(129).unwrap().get(), 256);
        assert_eq!(PaddedPieceSize::covering(256).unwrap().get(), 256);
        assert!(PaddedPieceSize::covering(u64::MAX).is_err());
    }

    #[test]
    fn derived_quantities() {
        let size = PaddedPieceSize::new(32 * GIB).unwrap();
        assert_eq!(size.unpadded(), 32 * GIB / 128 * 127);
        assert_eq!(PaddedPieceSize::MIN.unpadded(), 127);
        assert_eq!(PaddedPieceSize::MIN.leaves(), 4);
        assert_eq!(PaddedPieceSize::MIN.tree_height(), 2);
    }
}
