//! Segmentation and packing configuration.

use crate::error::{CoreError, CoreResult};
use crate::piece::{GIB, MIB, MIN_PADDED_PIECE_SIZE};

/// Configuration for [`crate::ArchiveSegmentor`].
#[derive(Debug, Clone)]
pub struct SegmentorConfig {
    /// Bytes per archive section.
    pub chunk_size: usize,

    /// Largest raw input accepted for one segment.
    pub max_segment_size: u64,
}

impl Default for SegmentorConfig {
    fn default() -> Self {
        Self {
            chunk_size: MIB as usize,
            max_segment_size: 31 * GIB,
        }
    }
}

impl SegmentorConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bytes per archive section.
    #[must_use]
    pub const fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets the largest raw input accepted for one segment.
    #[must_use]
    pub const fn max_segment_size(mut self, size: u64) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Checks the values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for a zero chunk or segment size.
    pub fn validate(&self) -> CoreResult<()> {
        if self.chunk_size == 0 {
            return Err(CoreError::invalid_config("chunk size must be positive"));
        }
        if self.max_segment_size == 0 {
            return Err(CoreError::invalid_config(
                "maximum segment size must be positive",
            ));
        }
        Ok(())
    }
}

/// Configuration for [`crate::packing::pack`].
#[derive(Debug, Clone)]
pub struct PackConfig {
    /// Padded capacity of one piece.
    pub capacity: u64,

    /// Most pieces opened in one pass.
    pub max_pieces: usize,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            capacity: 32 * GIB,
            max_pieces: 1,
        }
    }
}

impl PackConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the padded capacity of one piece.
    #[must_use]
    pub const fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the most pieces opened in one pass.
    #[must_use]
    pub const fn max_pieces(mut self, max_pieces: usize) -> Self {
        self.max_pieces = max_pieces;
        self
    }

    /// Checks the values are usable for finalized pieces.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] unless the capacity is a power of
    /// two with room for more than the header.
    pub fn validate(&self) -> CoreResult<()> {
        if !self.capacity.is_power_of_two() || self.capacity <= MIN_PADDED_PIECE_SIZE {
            return Err(CoreError::invalid_config(format!(
                "piece capacity {} must be a power of two larger than {MIN_PADDED_PIECE_SIZE}",
                self.capacity
            )));
        }
        Ok(())
    }
}
