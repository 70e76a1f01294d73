//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use bale_codec::Cid;
use bale_core::{PaddedPieceSize, PieceInfo, Segment};
use rand::Rng;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// Generate random data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate unplaced segments with random padded sizes between 128 bytes
/// and `2^max_exp` bytes.
pub fn random_segments(count: usize, max_exp: u32) -> Vec<Arc<Segment>> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let size = 1u64 << rng.gen_range(7..=max_exp);
            let digest: [u8; 32] = rng.gen();
            let cid = Cid::piece_commitment(&digest);
            Arc::new(Segment {
                locator: Segment::locator_for(&cid),
                info: PieceInfo {
                    cid,
                    size: PaddedPieceSize::new(size).unwrap_or(PaddedPieceSize::MIN),
                },
                raw_size: size,
                segmented_size: size,
                created_at: UNIX_EPOCH,
            })
        })
        .collect()
}
