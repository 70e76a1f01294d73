//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode value to CBOR.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Invalid CBOR structure.
    #[error("invalid CBOR structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Floating-point values are not part of any Bale encoding.
    #[error("floating-point values are forbidden")]
    FloatForbidden,

    /// Indefinite-length items are not canonical.
    #[error("indefinite-length encoding is forbidden")]
    IndefiniteLengthForbidden,

    /// A declared length exceeds what the decoder will allocate.
    #[error("size limit exceeded: claimed {claimed}, max allowed {max_allowed}")]
    SizeLimitExceeded {
        /// Size claimed by the input.
        claimed: u64,
        /// Maximum the decoder accepts.
        max_allowed: u64,
    },

    /// A varint does not fit in 64 bits.
    #[error("varint overflows 64 bits")]
    VarintOverflow,

    /// A varint was not encoded in the fewest possible bytes.
    #[error("varint is not minimally encoded")]
    NonMinimalVarint,

    /// A content identifier could not be parsed.
    #[error("invalid CID: {message}")]
    InvalidCid {
        /// Description of the problem.
        message: String,
    },

    /// Text is not valid lowercase base32.
    #[error("invalid base32 character {0:?}")]
    InvalidBase32(char),

    /// A section's payload does not hash to the CID it declares.
    #[error("section hash mismatch: declared {declared}, computed {computed}")]
    HashMismatch {
        /// CID recorded in the section.
        declared: String,
        /// CID computed over the payload.
        computed: String,
    },

    /// A section declares a length larger than the reader accepts.
    #[error("section length {len} exceeds limit {max}")]
    SectionTooLarge {
        /// Declared length.
        len: u64,
        /// Configured limit.
        max: u64,
    },

    /// An I/O error while reading sections from a stream.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O failure.
        message: String,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Create an invalid CID error.
    pub fn invalid_cid(message: impl Into<String>) -> Self {
        Self::InvalidCid {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::UnexpectedEof
        } else {
            Self::Io {
                message: err.to_string(),
            }
        }
    }
}
