//! CLI command implementations.

pub mod cat;
pub mod header;
pub mod inspect;
pub mod list;
pub mod pack;
pub mod segment;
pub mod verify;

use crate::error::{CliError, CliResult};
use bale_codec::Cid;
use bale_core::{ArchiveSegmentor, Segment, SegmentorConfig, GIB, MIB};
use bale_storage::{BlobStore, FileStore};
use serde::Serialize;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::info_span;

/// Default bytes per archive section.
pub const DEFAULT_CHUNK_SIZE: usize = MIB as usize;

/// Default piece capacity for `pack`.
pub const DEFAULT_PIECE_CAPACITY: u64 = 32 * GIB;

/// Opens the segment store at `path`.
///
/// Read-only commands pass `create = false` so a mistyped path is reported
/// instead of silently creating an empty store.
pub fn open_store(
    path: &Path,
    config: SegmentorConfig,
    create: bool,
) -> CliResult<ArchiveSegmentor> {
    if !create && !path.is_dir() {
        return Err(CliError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no segment store at {}", path.display()),
        )));
    }
    let store: Arc<dyn BlobStore> = Arc::new(FileStore::open(path)?);
    Ok(ArchiveSegmentor::open(
        store,
        config,
        info_span!("segmentor", path = %path.display()),
    )?)
}

/// Parses a CID argument.
pub fn parse_cid(arg: &str) -> CliResult<Cid> {
    Ok(arg.trim().parse()?)
}

/// Prints `value` as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One segment as printed by `list`, `segment` and `inspect`.
#[derive(Debug, Serialize)]
pub struct SegmentRow {
    /// Commitment CID.
    pub cid: String,
    /// Padded commitment size.
    pub size: u64,
    /// Input bytes.
    pub raw_size: u64,
    /// Archive bytes.
    pub segmented_size: u64,
    /// Creation time, seconds since the Unix epoch.
    pub created_at: u64,
}

impl From<&Segment> for SegmentRow {
    fn from(segment: &Segment) -> Self {
        Self {
            cid: segment.cid().to_string(),
            size: segment.size().get(),
            raw_size: segment.raw_size,
            segmented_size: segment.segmented_size,
            created_at: segment
                .created_at
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_secs()),
        }
    }
}

impl SegmentRow {
    fn print(&self) {
        println!(
            "{}  size={} raw={} segmented={}",
            self.cid, self.size, self.raw_size, self.segmented_size
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bale_core::{CancellationToken, Segmentor};
    use tempfile::TempDir;

    #[test]
    fn read_commands_require_existing_store() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(open_store(&missing, SegmentorConfig::default(), false).is_err());
        assert!(!missing.exists());
        assert!(open_store(&missing, SegmentorConfig::default(), true).is_ok());
    }

    #[test]
    fn rows_and_cids_round_trip() {
        let dir = TempDir::new().unwrap();
        let segmentor = open_store(dir.path(), SegmentorConfig::default(), true).unwrap();
        let segment = segmentor
            .segment(&mut &b"row"[..], &CancellationToken::new())
            .unwrap();
        let row = SegmentRow::from(segment.as_ref());
        assert_eq!(row.raw_size, 3);
        assert_eq!(row.size, 128);
        assert_eq!(parse_cid(&format!(" {} ", row.cid)).unwrap(), *segment.cid());
        assert!(parse_cid("not-a-cid").is_err());
    }
}
