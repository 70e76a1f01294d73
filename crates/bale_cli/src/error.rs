//! Errors surfaced by CLI commands.

use bale_codec::CodecError;
use bale_core::CoreError;
use bale_storage::StorageError;
use thiserror::Error;

/// A failed command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Segmentation, packing or verification failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The store could not be opened.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A CID or header did not parse.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Reading input or writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// One or more segments failed verification.
    #[error("{failed} of {checked} segments failed verification")]
    VerificationFailed {
        /// Segments that failed.
        failed: usize,
        /// Segments checked.
        checked: usize,
    },
}

/// Result alias for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
