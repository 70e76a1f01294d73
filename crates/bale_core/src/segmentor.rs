//! Turning byte streams into stored, commitment-addressed segments.
//!
//! ```text
//! input ──chunk──▶ write_section ──┬──▶ temporary blob ──commit──▶ <cid>.segment
//!                                  └──▶ CommitmentCalc ──digest──▶ cid, size
//! ```

use crate::commitment::CommitmentCalc;
use crate::config::SegmentorConfig;
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::Lifecycle;
use crate::manifest::{self, MANIFEST_NAME};
use crate::piece::PieceInfo;
use crate::segment::{empty_header_segment, Segment};
use async_trait::async_trait;
use bale_codec::archive::{write_section, SectionReader, EMPTY_HEADER_V1};
use bale_codec::Cid;
use bale_storage::{BlobReader, BlobStore, BlobWriter, StorageError};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Span};

/// Produces segments from byte streams.
pub trait Segmentor: Send + Sync {
    /// Reads `input` to the end and stores it as a new segment.
    ///
    /// # Errors
    ///
    /// - [`CoreError::SegmentTooLarge`] if the input exceeds the maximum size
    /// - [`CoreError::DuplicateSegment`] if identical content is already stored
    /// - [`CoreError::Cancelled`] if `cancel` fires between chunks
    /// - I/O and storage errors; the partial blob is discarded
    fn segment(&self, input: &mut dyn Read, cancel: &CancellationToken) -> CoreResult<Arc<Segment>>;

    /// Looks up a segment by commitment.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SegmentNotFound`] for unknown commitments.
    fn get_segment(&self, cid: &Cid) -> CoreResult<Arc<Segment>>;

    /// All stored segments, ordered by commitment.
    ///
    /// # Errors
    ///
    /// Implementations backed by remote indexes may fail.
    fn list_segments(&self) -> CoreResult<Vec<Arc<Segment>>>;
}

/// Serves the archive bytes of stored segments.
pub trait Retriever: Send + Sync {
    /// Opens the archive bytes of a segment.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SegmentNotFound`] for unknown commitments.
    fn retrieve(&self, cid: &Cid) -> CoreResult<BlobReader>;
}

/// Result of re-reading a stored segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentReport {
    /// Segment that was checked.
    pub info: PieceInfo,
    /// Number of sections read.
    pub sections: u64,
    /// Sum of section payload lengths.
    pub raw_size: u64,
    /// Bytes read from the blob.
    pub segmented_size: u64,
}

/// Segmentor writing headerless archives into a [`BlobStore`].
///
/// Each segment is one blob named `<cid>.segment`. The index is held in
/// memory and mirrored to the `SEGMENTS` manifest blob after every change.
pub struct ArchiveSegmentor {
    store: Arc<dyn BlobStore>,
    config: SegmentorConfig,
    index: RwLock<BTreeMap<Cid, Arc<Segment>>>,
    manifest_lock: Mutex<()>,
    span: Span,
}

impl ArchiveSegmentor {
    /// Opens a segmentor over `store`, loading any existing manifest.
    ///
    /// Manifest entries whose blob has gone missing are dropped.
    ///
    /// # Errors
    ///
    /// Fails for invalid configuration or an unreadable manifest.
    pub fn open(
        store: Arc<dyn BlobStore>,
        config: SegmentorConfig,
        span: Span,
    ) -> CoreResult<Self> {
        config.validate()?;
        let mut index = BTreeMap::new();
        let mut dropped = 0usize;

        {
            let _enter = span.enter();
            if store.contains(MANIFEST_NAME)? {
                for segment in manifest::decode(&store.read_all(MANIFEST_NAME)?)? {
                    if store.contains(&segment.locator)? {
                        index.insert(segment.info.cid.clone(), Arc::new(segment));
                    } else {
                        warn!(cid = %segment.info.cid, locator = %segment.locator, "segment blob missing; dropping from index");
                        dropped += 1;
                    }
                }
            }
            info!(segments = index.len(), dropped, "segment index loaded");
        }

        let segmentor = Self {
            store,
            config,
            index: RwLock::new(index),
            manifest_lock: Mutex::new(()),
            span,
        };
        if dropped > 0 {
            segmentor.save_manifest()?;
        }
        Ok(segmentor)
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SegmentorConfig {
        &self.config
    }

    /// Number of indexed segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    /// Whether no segments are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    fn save_manifest(&self) -> CoreResult<()> {
        let _guard = self.manifest_lock.lock();
        let bytes = {
            let index = self.index.read();
            manifest::encode(index.values().map(|segment| &**segment))?
        };
        self.store.put(MANIFEST_NAME, &bytes)?;
        Ok(())
    }

    /// Frames `input` into `blob`, returning (raw, segmented) byte counts.
    fn write_archive(
        &self,
        input: &mut dyn Read,
        cancel: &CancellationToken,
        blob: &mut dyn BlobWriter,
        calc: &mut CommitmentCalc,
    ) -> CoreResult<(u64, u64)> {
        let mut buf = vec![0u8; self.config.chunk_size];
        let mut raw_size = 0u64;
        let mut segmented_size = 0u64;
        let mut sink = Tee { blob, calc };

        loop {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            let n = read_chunk(input, &mut buf)?;
            if n == 0 {
                break;
            }
            raw_size += n as u64;
            if raw_size > self.config.max_segment_size {
                return Err(CoreError::SegmentTooLarge {
                    read: raw_size,
                    max: self.config.max_segment_size,
                });
            }
            segmented_size += write_section(&buf[..n], &mut sink)?;
            if n < buf.len() {
                break;
            }
        }
        sink.blob.flush()?;
        Ok((raw_size, segmented_size))
    }

    /// Re-reads a stored segment, re-parses every section and recomputes
    /// its commitment.
    ///
    /// # Errors
    ///
    /// - [`CoreError::SegmentNotFound`] for unknown commitments
    /// - [`CoreError::CorruptSection`] if a section is malformed or its
    ///   payload does not match its CID
    /// - [`CoreError::ChecksumMismatch`] if the recomputed commitment differs
    pub fn verify_segment(&self, cid: &Cid) -> CoreResult<SegmentReport> {
        let _enter = self.span.enter();
        let segment = self.get_segment(cid)?;
        let blob = self.store.open(&segment.locator)?;

        let mut calc = CommitmentCalc::new();
        let mut reader = SectionReader::new(
            TeeReader {
                inner: blob,
                calc: &mut calc,
            },
            segment.raw_size.max(1),
        );
        let mut sections = 0u64;
        let mut raw_size = 0u64;
        loop {
            let offset = reader.offset();
            match reader.next() {
                None => break,
                Some(Ok(section)) => {
                    sections += 1;
                    raw_size += section.payload.len() as u64;
                }
                Some(Err(source)) => {
                    warn!(%cid, offset, error = %source, "corrupt section");
                    return Err(CoreError::CorruptSection {
                        cid: cid.clone(),
                        offset,
                        source,
                    });
                }
            }
        }
        let segmented_size = reader.offset();
        drop(reader);

        let (commitment, size) = calc.digest()?;
        let actual = Cid::piece_commitment(&commitment);
        if actual != *cid || size != segment.info.size || raw_size != segment.raw_size {
            warn!(%cid, %actual, "segment commitment mismatch");
            return Err(CoreError::ChecksumMismatch {
                cid: cid.clone(),
                actual,
            });
        }

        debug!(%cid, sections, raw_size, "segment verified");
        Ok(SegmentReport {
            info: segment.info.clone(),
            sections,
            raw_size,
            segmented_size,
        })
    }

    /// Writes the original input of a segment, without archive framing, to `out`.
    ///
    /// Returns the number of payload bytes written. Section hashes are checked
    /// as they are read.
    ///
    /// # Errors
    ///
    /// Fails for unknown segments, corrupt sections, or write errors.
    pub fn copy_payload(&self, cid: &Cid, out: &mut dyn Write) -> CoreResult<u64> {
        let segment = self.get_segment(cid)?;
        let blob = self.store.open(&segment.locator)?;
        let mut reader = SectionReader::new(blob, segment.raw_size.max(1));
        let mut written = 0u64;
        loop {
            let offset = reader.offset();
            match reader.next() {
                None => break,
                Some(Ok(section)) => {
                    out.write_all(&section.payload)?;
                    written += section.payload.len() as u64;
                }
                Some(Err(source)) => {
                    return Err(CoreError::CorruptSection {
                        cid: cid.clone(),
                        offset,
                        source,
                    })
                }
            }
        }
        Ok(written)
    }
}

impl Segmentor for ArchiveSegmentor {
    fn segment(&self, input: &mut dyn Read, cancel: &CancellationToken) -> CoreResult<Arc<Segment>> {
        let _enter = self.span.enter();
        let mut blob = self.store.create()?;
        let mut calc = CommitmentCalc::new();

        let written = self
            .write_archive(input, cancel, blob.as_mut(), &mut calc)
            .and_then(|sizes| Ok((sizes, calc.digest()?)));
        let ((raw_size, segmented_size), (commitment, size)) = match written {
            Ok(done) => done,
            Err(err) => {
                if let Err(abort_err) = blob.abort() {
                    warn!(error = %abort_err, "failed to discard partial segment");
                }
                debug!(error = %err, "segmentation aborted");
                return Err(err);
            }
        };

        let info = PieceInfo {
            cid: Cid::piece_commitment(&commitment),
            size,
        };
        let locator = Segment::locator_for(&info.cid);
        match blob.commit(&locator) {
            Ok(_) => {}
            Err(StorageError::AlreadyExists(_)) => {
                debug!(cid = %info.cid, "duplicate segment content");
                return Err(CoreError::DuplicateSegment(info.cid));
            }
            Err(err) => return Err(err.into()),
        }

        let segment = Arc::new(Segment {
            info,
            raw_size,
            segmented_size,
            created_at: SystemTime::now(),
            locator,
        });
        self.index
            .write()
            .insert(segment.info.cid.clone(), Arc::clone(&segment));
        if let Err(err) = self.save_manifest() {
            self.index.write().remove(&segment.info.cid);
            if let Err(remove_err) = self.store.remove(&segment.locator) {
                warn!(cid = %segment.info.cid, error = %remove_err, "failed to remove unindexed segment blob");
            }
            warn!(cid = %segment.info.cid, error = %err, "manifest update failed; segment discarded");
            return Err(err);
        }

        info!(
            cid = %segment.info.cid,
            size = segment.info.size.get(),
            raw_size,
            segmented_size,
            "segment created"
        );
        Ok(segment)
    }

    fn get_segment(&self, cid: &Cid) -> CoreResult<Arc<Segment>> {
        self.index
            .read()
            .get(cid)
            .cloned()
            .ok_or_else(|| CoreError::SegmentNotFound(cid.clone()))
    }

    fn list_segments(&self) -> CoreResult<Vec<Arc<Segment>>> {
        Ok(self.index.read().values().cloned().collect())
    }
}

impl Retriever for ArchiveSegmentor {
    fn retrieve(&self, cid: &Cid) -> CoreResult<BlobReader> {
        if *cid == empty_header_segment().info.cid {
            return Ok(Box::new(Cursor::new(EMPTY_HEADER_V1)));
        }
        let segment = self.get_segment(cid)?;
        match self.store.open(&segment.locator) {
            Ok(reader) => Ok(reader),
            Err(err) if err.is_not_found() => Err(CoreError::SegmentNotFound(cid.clone())),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl Lifecycle for ArchiveSegmentor {
    type Error = CoreError;

    async fn start(&self) -> CoreResult<()> {
        self.span
            .in_scope(|| info!(segments = self.len(), "segmentor started"));
        Ok(())
    }

    async fn shutdown(&self) -> CoreResult<()> {
        self.save_manifest()?;
        self.span.in_scope(|| info!("segmentor stopped"));
        Ok(())
    }
}

/// Fills `buf` from `input` unless end of input comes first.
fn read_chunk(input: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

struct Tee<'a> {
    blob: &'a mut dyn BlobWriter,
    calc: &'a mut CommitmentCalc,
}

impl Write for Tee<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.blob.write(buf)?;
        self.calc.write_all(&buf[..n])?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.blob.flush()
    }
}

struct TeeReader<'a, R> {
    inner: R,
    calc: &'a mut CommitmentCalc,
}

impl<R: Read> Read for TeeReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.calc.write_all(&buf[..n])?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bale_codec::archive::Section;
    use bale_storage::InMemoryStore;

    fn segmentor(store: Arc<dyn BlobStore>, chunk: usize, max: u64) -> ArchiveSegmentor {
        let config = SegmentorConfig::new().chunk_size(chunk).max_segment_size(max);
        ArchiveSegmentor::open(store, config, Span::none()).unwrap()
    }

    #[test]
    fn segment_frames_and_registers() {
        let store = Arc::new(InMemoryStore::new());
        let seg = segmentor(store.clone(), 64, 1 << 20);
        let data: Vec<u8> = (0..250u32).map(|i| i as u8).collect();

        let segment = seg
            .segment(&mut data.as_slice(), &CancellationToken::new())
            .unwrap();
        assert_eq!(segment.raw_size, 250);
        // Sections of 64, 64, 64 and 58 bytes, each with a one-byte varint and a 36-byte CID.
        assert_eq!(segment.segmented_size, 250 + 4 * 37);
        assert_eq!(segment.locator, Segment::locator_for(segment.cid()));

        let blob = store.read_all(&segment.locator).unwrap();
        assert_eq!(blob.len() as u64, segment.segmented_size);
        let (first, used) = Section::parse(&blob).unwrap();
        assert_eq!(first.payload, &data[..64]);
        assert_eq!(used, 101);

        let expected = crate::commitment::piece_commitment(&blob).unwrap();
        assert_eq!(segment.info, expected);
        assert_eq!(*seg.get_segment(segment.cid()).unwrap(), *segment);
        assert_eq!(seg.list_segments().unwrap().len(), 1);
    }

    #[test]
    fn oversized_input_is_discarded() {
        let store = Arc::new(InMemoryStore::new());
        let seg = segmentor(store.clone(), 64, 100);
        let data = vec![1u8; 200];
        let err = seg
            .segment(&mut data.as_slice(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::SegmentTooLarge { read: 128, max: 100 }));
        assert!(store.is_empty());
        assert!(seg.is_empty());
    }

    #[test]
    fn duplicate_content_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let seg = segmentor(store, 64, 1 << 20);
        let token = CancellationToken::new();
        let first = seg.segment(&mut &b"same bytes"[..], &token).unwrap();
        let err = seg.segment(&mut &b"same bytes"[..], &token).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateSegment(cid) if cid == first.info.cid));
        assert_eq!(seg.len(), 1);
    }

    #[test]
    fn cancelled_before_first_chunk() {
        let store = Arc::new(InMemoryStore::new());
        let seg = segmentor(store.clone(), 64, 1 << 20);
        let token = CancellationToken::new();
        token.cancel();
        let err = seg.segment(&mut &b"data"[..], &token).unwrap_err();
        assert!(err.is_cancelled());
        assert!(store.is_empty());
    }

    #[test]
    fn write_failure_cleans_up() {
        let store = Arc::new(InMemoryStore::with_blob_limit(100));
        let seg = segmentor(store.clone(), 64, 1 << 20);
        let data = vec![9u8; 500];
        let err = seg
            .segment(&mut data.as_slice(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_segment() {
        let seg = segmentor(Arc::new(InMemoryStore::new()), 64, 1 << 20);
        let cid = Cid::piece_commitment(&[1u8; 32]);
        assert!(seg.get_segment(&cid).unwrap_err().is_not_found());
        assert!(matches!(
            seg.retrieve(&cid),
            Err(CoreError::SegmentNotFound(_))
        ));
    }

    #[test]
    fn header_served_from_constant() {
        let seg = segmentor(Arc::new(InMemoryStore::new()), 64, 1 << 20);
        let mut reader = seg.retrieve(empty_header_segment().cid()).unwrap();
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, EMPTY_HEADER_V1);
    }

    #[test]
    fn verify_and_copy_payload() {
        let store = Arc::new(InMemoryStore::new());
        let seg = segmentor(store.clone(), 32, 1 << 20);
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 7) as u8).collect();
        let segment = seg
            .segment(&mut data.as_slice(), &CancellationToken::new())
            .unwrap();

        let report = seg.verify_segment(segment.cid()).unwrap();
        assert_eq!(report.sections, 32);
        assert_eq!(report.raw_size, 1000);
        assert_eq!(report.segmented_size, segment.segmented_size);

        let mut out = Vec::new();
        assert_eq!(seg.copy_payload(segment.cid(), &mut out).unwrap(), 1000);
        assert_eq!(out, data);
    }

    #[test]
    fn verify_detects_tampering() {
        let store = Arc::new(InMemoryStore::new());
        let seg = segmentor(store.clone(), 32, 1 << 20);
        let segment = seg
            .segment(&mut &[4u8; 100][..], &CancellationToken::new())
            .unwrap();

        let mut blob = store.read_all(&segment.locator).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 1;
        store.put(&segment.locator, &blob).unwrap();

        assert!(matches!(
            seg.verify_segment(segment.cid()),
            Err(CoreError::CorruptSection { .. })
        ));
    }

    #[test]
    fn index_survives_reopen() {
        let store: Arc<dyn BlobStore> = Arc::new(InMemoryStore::new());
        let first = {
            let seg = segmentor(Arc::clone(&store), 64, 1 << 20);
            seg.segment(&mut &b"persist me"[..], &CancellationToken::new())
                .unwrap()
        };

        let reopened = segmentor(store, 64, 1 << 20);
        let loaded = reopened.get_segment(first.cid()).unwrap();
        assert_eq!(loaded.raw_size, first.raw_size);
        assert_eq!(loaded.info, first.info);
    }

    #[test]
    fn missing_blob_dropped_on_reopen() {
        let store = Arc::new(InMemoryStore::new());
        let segment = {
            let seg = segmentor(store.clone(), 64, 1 << 20);
            seg.segment(&mut &b"short lived"[..], &CancellationToken::new())
                .unwrap()
        };
        store.remove(&segment.locator).unwrap();

        let reopened = segmentor(store, 64, 1 << 20);
        assert!(reopened.is_empty());
    }

    /// In-memory store whose manifest writes fail while `fail` is set.
    struct ManifestFailingStore {
        inner: InMemoryStore,
        fail: std::sync::atomic::AtomicBool,
    }

    impl ManifestFailingStore {
        fn set_failing(&self, fail: bool) {
            self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl BlobStore for ManifestFailingStore {
        fn create(&self) -> bale_storage::StorageResult<Box<dyn BlobWriter>> {
            self.inner.create()
        }

        fn open(&self, name: &str) -> bale_storage::StorageResult<BlobReader> {
            self.inner.open(name)
        }

        fn size(&self, name: &str) -> bale_storage::StorageResult<u64> {
            self.inner.size(name)
        }

        fn contains(&self, name: &str) -> bale_storage::StorageResult<bool> {
            self.inner.contains(name)
        }

        fn list(&self) -> bale_storage::StorageResult<Vec<String>> {
            self.inner.list()
        }

        fn remove(&self, name: &str) -> bale_storage::StorageResult<()> {
            self.inner.remove(name)
        }

        fn put(&self, name: &str, data: &[u8]) -> bale_storage::StorageResult<()> {
            if name == MANIFEST_NAME && self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(StorageError::Io(io::Error::other("disk full")));
            }
            self.inner.put(name, data)
        }
    }

    #[test]
    fn manifest_failure_leaves_no_trace() {
        let store = Arc::new(ManifestFailingStore {
            inner: InMemoryStore::new(),
            fail: std::sync::atomic::AtomicBool::new(true),
        });
        let seg = segmentor(store.clone(), 64, 1 << 20);
        let data = vec![4u8; 300];

        let err = seg
            .segment(&mut data.as_slice(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
        assert!(seg.is_empty());
        assert!(store.list().unwrap().is_empty());

        store.set_failing(false);
        let segment = seg
            .segment(&mut data.as_slice(), &CancellationToken::new())
            .unwrap();
        assert_eq!(seg.get_segment(segment.cid()).unwrap().raw_size, 300);
        assert!(store.contains(MANIFEST_NAME).unwrap());
    }
}
