//! Directory-backed blob store.
//!
//! ```text
//! <root>/
//! ├─ LOCK              # Advisory lock for single-writer
//! ├─ .<random>.temp    # Blobs being written
//! └─ <name>            # Committed blobs
//! ```

use crate::error::{StorageError, StorageResult};
use crate::store::{validate_name, BlobReader, BlobStore, BlobWriter};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const LOCK_FILE: &str = "LOCK";
const TEMP_PREFIX: &str = ".";
const TEMP_SUFFIX: &str = ".temp";

/// A blob store keeping one file per blob in a directory.
///
/// # Thread Safety
///
/// The store holds an exclusive advisory lock on its directory, so only one
/// `FileStore` may exist per directory at a time. Within the process it can
/// be shared freely.
///
/// # Durability
///
/// Blobs are fsynced before being renamed into place; a crash leaves either
/// the whole blob or a stray temporary file, which the next [`FileStore::open`]
/// deletes.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    _lock_file: File,
}

impl FileStore {
    /// Opens a store directory, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process holds the
    /// directory, or an I/O error.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        if !root.is_dir() {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a directory: {}", root.display()),
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(root.to_path_buf()));
        }

        let store = Self {
            root: root.to_path_buf(),
            _lock_file: lock_file,
        };
        store.remove_stale_temps()?;
        Ok(store)
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, name: &str) -> StorageResult<PathBuf> {
        validate_name(name)?;
        if name == LOCK_FILE {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    fn remove_stale_temps(&self) -> StorageResult<()> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX) {
                tracing::debug!(file = %name, "removing stale temporary blob");
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    fn new_temp(&self) -> io::Result<NamedTempFile> {
        tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&self.root)
    }
}

fn not_found(name: &str, err: io::Error) -> StorageError {
    if err.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(name.to_string())
    } else {
        StorageError::Io(err)
    }
}

impl BlobStore for FileStore {
    fn create(&self) -> StorageResult<Box<dyn BlobWriter>> {
        let temp = self.new_temp()?;
        Ok(Box::new(FileWriter {
            root: self.root.clone(),
            inner: BufWriter::new(temp),
            written: 0,
        }))
    }

    fn open(&self, name: &str) -> StorageResult<BlobReader> {
        let path = self.blob_path(name)?;
        let file = File::open(path).map_err(|e| not_found(name, e))?;
        Ok(Box::new(io::BufReader::new(file)))
    }

    fn size(&self, name: &str) -> StorageResult<u64> {
        let path = self.blob_path(name)?;
        Ok(fs::metadata(path).map_err(|e| not_found(name, e))?.len())
    }

    fn contains(&self, name: &str) -> StorageResult<bool> {
        Ok(self.blob_path(name)?.is_file())
    }

    fn list(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name != LOCK_FILE && validate_name(&name).is_ok() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn remove(&self, name: &str) -> StorageResult<()> {
        let path = self.blob_path(name)?;
        fs::remove_file(path).map_err(|e| not_found(name, e))
    }

    fn put(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.blob_path(name)?;
        let mut temp = self.new_temp()?;
        temp.write_all(data)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }
}

struct FileWriter {
    root: PathBuf,
    inner: BufWriter<NamedTempFile>,
    written: u64,
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl BlobWriter for FileWriter {
    fn written(&self) -> u64 {
        self.written
    }

    fn commit(self: Box<Self>, name: &str) -> StorageResult<u64> {
        validate_name(name)?;
        if name == LOCK_FILE {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        let written = self.written;
        let temp = self.inner.into_inner().map_err(|e| e.into_error())?;
        temp.as_file().sync_all()?;

        match temp.persist_noclobber(self.root.join(name)) {
            Ok(_) => Ok(written),
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(name.to_string()))
            }
            Err(err) => Err(StorageError::Io(err.error)),
        }
    }

    fn abort(self: Box<Self>) -> StorageResult<()> {
        let temp = self.inner.into_inner().map_err(|e| e.into_error())?;
        temp.close()?;
        Ok(())
    }
}
