//! # Bale Codec
//!
//! Byte-level encodings shared by every Bale crate.
//!
//! This crate provides:
//! - Unsigned LEB128 varints ([`varint`])
//! - Version 1 content identifiers ([`Cid`]) with their binary and base32 text forms
//! - Canonical CBOR encoding/decoding ([`Value`], [`to_canonical_cbor`], [`from_cbor`])
//! - Archive sections: the length-prefixed, content-identified frames a segment
//!   is made of, and the fixed empty archive header ([`archive`])
//!
//! ## Archive Section Format
//!
//! ```text
//! | varint(len(cid) + len(payload)) | cid (36) | payload (N) |
//! ```
//!
//! The CID is always CIDv1 with the `raw` codec and a SHA-256 multihash, so
//! it is exactly 36 bytes long.
//!
//! ## Usage
//!
//! ```
//! use bale_codec::archive::{Section, EMPTY_HEADER_V1};
//! use bale_codec::varint;
//!
//! let section = Section::new(b"hello".to_vec());
//! let bytes = section.encode();
//! let (parsed, consumed) = Section::parse(&bytes).unwrap();
//! assert_eq!(parsed.payload, b"hello");
//! assert_eq!(consumed, bytes.len());
//!
//! let (len, _) = varint::decode(&EMPTY_HEADER_V1).unwrap();
//! assert_eq!(len, 17);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod archive;
pub mod base32;
mod cid;
mod decoder;
mod encoder;
mod error;
mod value;
pub mod varint;

pub use cid::{multicodec, Cid, MAX_DIGEST_LEN};
pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// CBOR tag marking a byte string as a CID link.
pub const CID_LINK_TAG: u64 = 42;
