//! Property-based test generators using proptest.
//!
//! Provides strategies for generating payloads, chunk sizes and piece
//! sizes that respect the archive and packing invariants.

use bale_core::{Segment, MIN_PADDED_PIECE_SIZE};
use proptest::prelude::*;
use std::sync::Arc;

use crate::fixtures::synthetic_segments;

/// Strategy for generating payloads of up to `max_len` bytes.
pub fn payload_strategy(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Strategy for generating section chunk sizes.
pub fn chunk_size_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![1usize..=64, 65usize..=4096]
}

/// Strategy for generating padded piece sizes between 128 bytes and
/// `2^max_exp` bytes.
pub fn padded_size_strategy(max_exp: u32) -> impl Strategy<Value = u64> {
    let min_exp = MIN_PADDED_PIECE_SIZE.trailing_zeros();
    (min_exp..=max_exp.max(min_exp)).prop_map(|exp| 1u64 << exp)
}

/// Strategy for generating lists of padded segment sizes.
pub fn segment_sizes_strategy(
    max_exp: u32,
    max_count: usize,
) -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(padded_size_strategy(max_exp), 0..=max_count)
}

/// Strategy for generating synthetic segments ready for packing.
pub fn segments_strategy(
    max_exp: u32,
    max_count: usize,
) -> impl Strategy<Value = Vec<Arc<Segment>>> {
    segment_sizes_strategy(max_exp, max_count).prop_map(|sizes| synthetic_segments(&sizes))
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
