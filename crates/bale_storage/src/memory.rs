//! In-memory blob store for testing.

use crate::error::{StorageError, StorageResult};
use crate::store::{validate_name, BlobReader, BlobStore, BlobWriter};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::{self, Cursor, Write};
use std::sync::Arc;

type Blobs = Arc<RwLock<BTreeMap<String, Arc<Vec<u8>>>>>;

/// An in-memory blob store.
///
/// Suitable for unit tests, integration tests, and nodes that do not need
/// their segments to outlive the process.
///
/// # Example
///
/// ```rust
/// use bale_storage::{BlobStore, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// store.put("MANIFEST", b"v1").unwrap();
/// assert_eq!(store.size("MANIFEST").unwrap(), 2);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    blobs: Blobs,
    blob_limit: Option<u64>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose writers fail once a blob exceeds `limit` bytes.
    ///
    /// Used to exercise write-failure paths.
    #[must_use]
    pub fn with_blob_limit(limit: u64) -> Self {
        Self {
            blob_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Number of committed blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Whether the store holds no blobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl BlobStore for InMemoryStore {
    fn create(&self) -> StorageResult<Box<dyn BlobWriter>> {
        Ok(Box::new(MemoryWriter {
            blobs: Arc::clone(&self.blobs),
            buffer: Vec::new(),
            limit: self.blob_limit,
        }))
    }

    fn open(&self, name: &str) -> StorageResult<BlobReader> {
        let data = self
            .blobs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        Ok(Box::new(Cursor::new(SharedBytes(data))))
    }

    fn size(&self, name: &str) -> StorageResult<u64> {
        self.blobs
            .read()
            .get(name)
            .map(|data| data.len() as u64)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn contains(&self, name: &str) -> StorageResult<bool> {
        Ok(self.blobs.read().contains_key(name))
    }

    fn list(&self) -> StorageResult<Vec<String>> {
        Ok(self.blobs.read().keys().cloned().collect())
    }

    fn remove(&self, name: &str) -> StorageResult<()> {
        self.blobs
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn put(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        validate_name(name)?;
        self.blobs
            .write()
            .insert(name.to_string(), Arc::new(data.to_vec()));
        Ok(())
    }
}

struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

struct MemoryWriter {
    blobs: Blobs,
    buffer: Vec<u8>,
    limit: Option<u64>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(limit) = self.limit {
            if (self.buffer.len() + buf.len()) as u64 > limit {
                return Err(io::Error::other("blob size limit exceeded"));
            }
        }
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlobWriter for MemoryWriter {
    fn written(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn commit(self: Box<Self>, name: &str) -> StorageResult<u64> {
        validate_name(name)?;
        let mut blobs = self.blobs.write();
        if blobs.contains_key(name) {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        let size = self.buffer.len() as u64;
        blobs.insert(name.to_string(), Arc::new(self.buffer));
        Ok(size)
    }

    fn abort(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn uncommitted_blob_is_invisible() {
        let store = InMemoryStore::new();
        let mut writer = store.create().unwrap();
        writer.write_all(b"partial").unwrap();
        assert_eq!(writer.written(), 7);
        assert!(store.is_empty());

        writer.abort().unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn commit_refuses_to_clobber() {
        let store = InMemoryStore::new();
        let mut first = store.create().unwrap();
        first.write_all(b"one").unwrap();
        assert_eq!(first.commit("blob").unwrap(), 3);

        let mut second = store.create().unwrap();
        second.write_all(b"two").unwrap();
        assert!(matches!(
            second.commit("blob"),
            Err(StorageError::AlreadyExists(_))
        ));
        assert_eq!(store.read_all("blob").unwrap(), b"one");
    }

    #[test]
    fn put_replaces() {
        let store = InMemoryStore::new();
        store.put("MANIFEST", b"old").unwrap();
        store.put("MANIFEST", b"newer").unwrap();
        assert_eq!(store.read_all("MANIFEST").unwrap(), b"newer");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_blob() {
        let store = InMemoryStore::new();
        assert!(store.open("nope").is_err());
        assert!(store.size("nope").unwrap_err().is_not_found());
        assert!(store.remove("nope").unwrap_err().is_not_found());
        assert!(!store.contains("nope").unwrap());
    }

    #[test]
    fn reader_sees_snapshot() {
        let store = InMemoryStore::new();
        store.put("blob", b"abc").unwrap();
        let mut reader = store.open("blob").unwrap();
        store.remove("blob").unwrap();

        let mut data = Vec::new();
        reader.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"abc");
    }

    #[test]
    fn blob_limit() {
        let store = InMemoryStore::with_blob_limit(4);
        let mut writer = store.create().unwrap();
        writer.write_all(b"1234").unwrap();
        assert!(writer.write_all(b"5").is_err());
    }
}
