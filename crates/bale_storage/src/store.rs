//! Blob store traits.

use crate::error::{StorageError, StorageResult};
use std::io::{Read, Seek, Write};

/// A seekable byte source.
pub trait BlobRead: Read + Seek + Send {}

impl<T: Read + Seek + Send> BlobRead for T {}

/// Readable handle on a committed blob.
pub type BlobReader = Box<dyn BlobRead>;

/// A flat store of immutable, named blobs.
///
/// # Invariants
///
/// - A blob is visible to `open`, `list` and `contains` only after its
///   writer has been committed
/// - `commit` never overwrites an existing blob
/// - `put` atomically replaces a blob; readers see the old or the new bytes
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait BlobStore: Send + Sync {
    /// Starts a new anonymous blob.
    ///
    /// # Errors
    ///
    /// Returns an error if temporary space cannot be allocated.
    fn create(&self) -> StorageResult<Box<dyn BlobWriter>>;

    /// Opens a committed blob for reading.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no blob has that name.
    fn open(&self, name: &str) -> StorageResult<BlobReader>;

    /// Size in bytes of a committed blob.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no blob has that name.
    fn size(&self, name: &str) -> StorageResult<u64>;

    /// Whether a blob with this name has been committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn contains(&self, name: &str) -> StorageResult<bool>;

    /// Names of all committed blobs, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    fn list(&self) -> StorageResult<Vec<String>>;

    /// Deletes a committed blob.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no blob has that name.
    fn remove(&self, name: &str) -> StorageResult<()>;

    /// Writes a small blob in one step, replacing any existing blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or the replacement fails.
    fn put(&self, name: &str, data: &[u8]) -> StorageResult<()>;

    /// Reads a whole blob into memory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no blob has that name.
    fn read_all(&self, name: &str) -> StorageResult<Vec<u8>> {
        let mut reader = self.open(name)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(data)
    }
}

/// A blob being written.
///
/// Dropping a writer without committing discards its bytes.
pub trait BlobWriter: Write + Send {
    /// Bytes written so far.
    fn written(&self) -> u64;

    /// Makes the blob visible under `name` and returns its size.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] if `name` is taken; the
    /// written bytes are discarded.
    fn commit(self: Box<Self>, name: &str) -> StorageResult<u64>;

    /// Discards the blob.
    ///
    /// # Errors
    ///
    /// Returns an error if temporary space cannot be released.
    fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// Checks that `name` can be used as a blob name.
///
/// Names are non-empty, contain no path separators, and do not start with `.`.
///
/// # Errors
///
/// Returns [`StorageError::InvalidName`] otherwise.
pub fn validate_name(name: &str) -> StorageResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
        && name.len() <= 255;
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert!(validate_name("bafkreia.segment").is_ok());
        assert!(validate_name("SEGMENTS").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("..").is_err());
    }

    mod props {
        use super::*;
        use crate::InMemoryStore;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn separators_are_rejected(
                prefix in "[a-z0-9]{0,8}",
                sep in prop_oneof![Just('/'), Just('\\'), Just('\0')],
                suffix in "[a-z0-9]{0,8}",
            ) {
                let name = format!("{prefix}{sep}{suffix}");
                prop_assert!(validate_name(&name).is_err());
            }

            #[test]
            fn dotfiles_are_rejected(rest in "[a-zA-Z0-9._-]{0,16}") {
                let name = format!(".{rest}");
                prop_assert!(validate_name(&name).is_err());
            }

            #[test]
            fn valid_names_round_trip(name in "[a-z0-9][a-z0-9._-]{0,64}", data in any::<Vec<u8>>()) {
                prop_assert!(validate_name(&name).is_ok());
                let store = InMemoryStore::new();
                store.put(&name, &data).unwrap();
                prop_assert!(store.contains(&name).unwrap());
                prop_assert_eq!(store.read_all(&name).unwrap(), data);
            }
        }
    }
}
