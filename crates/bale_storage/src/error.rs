//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No blob exists under the name.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// A blob already exists under the name.
    #[error("blob already exists: {0}")]
    AlreadyExists(String),

    /// The name cannot be used for a blob.
    #[error("invalid blob name: {0:?}")]
    InvalidName(String),

    /// Another process holds the store directory.
    #[error("store directory is locked by another process: {0}")]
    Locked(PathBuf),
}

impl StorageError {
    /// Returns true if this error means the blob does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
