//! Test fixtures and segmentor helpers.
//!
//! Provides convenience functions for setting up segment stores and
//! synthetic segments for packing scenarios.

use bale_codec::Cid;
use bale_core::{
    ArchiveSegmentor, CancellationToken, PaddedPieceSize, PieceInfo, Segment, Segmentor,
    SegmentorConfig,
};
use bale_storage::{BlobStore, FileStore, InMemoryStore};
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tempfile::TempDir;
use tracing::Span;

/// A test segmentor with automatic cleanup.
pub struct TestSegmentor {
    /// The segmentor instance.
    pub segmentor: ArchiveSegmentor,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestSegmentor {
    /// Creates a segmentor over an in-memory store.
    pub fn memory() -> Self {
        Self::memory_with(SegmentorConfig::default())
    }

    /// Creates a segmentor over an in-memory store with `config`.
    pub fn memory_with(config: SegmentorConfig) -> Self {
        let store: Arc<dyn BlobStore> = Arc::new(InMemoryStore::new());
        Self {
            segmentor: ArchiveSegmentor::open(store, config, Span::none())
                .expect("Failed to open in-memory segmentor"),
            temp_dir: None,
        }
    }

    /// Creates a segmentor over a temporary directory.
    pub fn file() -> Self {
        Self::file_with(SegmentorConfig::default())
    }

    /// Creates a segmentor over a temporary directory with `config`.
    pub fn file_with(config: SegmentorConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store: Arc<dyn BlobStore> =
            Arc::new(FileStore::open(temp_dir.path()).expect("Failed to open file store"));
        Self {
            segmentor: ArchiveSegmentor::open(store, config, Span::none())
                .expect("Failed to open file segmentor"),
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Segments `data`, panicking on failure.
    pub fn store_bytes(&self, data: &[u8]) -> Arc<Segment> {
        self.segmentor
            .segment(&mut &data[..], &CancellationToken::new())
            .expect("Failed to segment data")
    }

    /// Closes the segmentor and reopens it over the same directory.
    ///
    /// # Panics
    ///
    /// Panics for in-memory fixtures.
    #[must_use]
    pub fn reopen(self) -> Self {
        let temp_dir = self.temp_dir.expect("Only file fixtures can be reopened");
        let config = self.segmentor.config().clone();
        drop(self.segmentor);
        let store: Arc<dyn BlobStore> =
            Arc::new(FileStore::open(temp_dir.path()).expect("Failed to reopen file store"));
        Self {
            segmentor: ArchiveSegmentor::open(store, config, Span::none())
                .expect("Failed to reopen segmentor"),
            temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestSegmentor {
    type Target = ArchiveSegmentor;

    fn deref(&self) -> &Self::Target {
        &self.segmentor
    }
}

/// Runs a test with a temporary in-memory segmentor.
pub fn with_temp_segmentor<F, R>(f: F) -> R
where
    F: FnOnce(&ArchiveSegmentor) -> R,
{
    let fixture = TestSegmentor::memory();
    f(&fixture.segmentor)
}

/// Deterministic pseudo-random bytes.
pub fn sample_data(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

/// A segment of the given padded size with a unique fake commitment.
///
/// Not backed by any store; meant for packing tests.
pub fn synthetic_segment(size: u64, tag: u64) -> Arc<Segment> {
    let size = PaddedPieceSize::new(size).expect("Synthetic size must be a power of two");
    let mut digest = [0u8; 32];
    digest[..8].copy_from_slice(&tag.to_be_bytes());
    digest[8..16].copy_from_slice(&size.get().to_be_bytes());
    let cid = Cid::piece_commitment(&digest);
    Arc::new(Segment {
        locator: Segment::locator_for(&cid),
        info: PieceInfo { cid, size },
        raw_size: size.unpadded(),
        segmented_size: size.unpadded(),
        created_at: UNIX_EPOCH,
    })
}

/// Synthetic segments for each size, tagged by position.
pub fn synthetic_segments(sizes: &[u64]) -> Vec<Arc<Segment>> {
    sizes
        .iter()
        .enumerate()
        .map(|(i, size)| synthetic_segment(*size, i as u64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_fixture_stores_segments() {
        let fixture = TestSegmentor::memory();
        assert!(fixture.path().is_none());
        let segment = fixture.store_bytes(b"abc");
        assert_eq!(fixture.list_segments().unwrap().len(), 1);
        assert_eq!(segment.raw_size, 3);
    }

    #[test]
    fn file_fixture_survives_reopen() {
        let fixture = TestSegmentor::file();
        let segment = fixture.store_bytes(&sample_data(4096, 1));
        let fixture = fixture.reopen();
        let reloaded = fixture.get_segment(segment.cid()).unwrap();
        assert_eq!(reloaded.info, segment.info);
        assert_eq!(reloaded.segmented_size, segment.segmented_size);
    }

    #[test]
    fn sample_data_is_deterministic() {
        assert_eq!(sample_data(64, 3), sample_data(64, 3));
        assert_ne!(sample_data(64, 3), sample_data(64, 4));
    }

    #[test]
    fn synthetic_segments_are_distinct() {
        let segments = synthetic_segments(&[128, 128, 1024]);
        assert_ne!(segments[0].cid(), segments[1].cid());
        assert_eq!(segments[2].size().get(), 1024);
    }

    #[test]
    fn with_temp_segmentor_runs_closure() {
        let count = with_temp_segmentor(|s| s.len());
        assert_eq!(count, 0);
    }
}
