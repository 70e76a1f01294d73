//! Version 1 content identifiers.
//!
//! Binary form: `varint(1) varint(codec) varint(hash_code) varint(digest_len) digest`.
//! Text form: multibase `b` followed by lowercase base32 of the binary form.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::base32;
use crate::error::{CodecError, CodecResult};
use crate::varint;

/// Longest digest a [`Cid`] may carry.
pub const MAX_DIGEST_LEN: usize = 64;

/// Multicodec codes used by Bale.
pub mod multicodec {
    /// Raw binary content.
    pub const RAW: u64 = 0x55;
    /// DAG-CBOR content.
    pub const DAG_CBOR: u64 = 0x71;
    /// Unsealed sector or piece commitment.
    pub const FIL_COMMITMENT_UNSEALED: u64 = 0xf101;
    /// SHA-256 multihash.
    pub const SHA2_256: u64 = 0x12;
    /// SHA-256 truncated to 254 bits, binary tree with zero padding.
    pub const SHA2_256_TRUNC254_PADDED: u64 = 0x1012;
}

const CID_VERSION: u64 = 1;

/// A CIDv1.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid {
    codec: u64,
    hash_code: u64,
    digest: Vec<u8>,
}

impl Cid {
    /// Build a CID from its parts.
    ///
    /// # Errors
    ///
    /// Fails if the digest is longer than [`MAX_DIGEST_LEN`].
    pub fn new_v1(codec: u64, hash_code: u64, digest: &[u8]) -> CodecResult<Self> {
        if digest.len() > MAX_DIGEST_LEN {
            return Err(CodecError::invalid_cid(format!(
                "digest of {} bytes exceeds {MAX_DIGEST_LEN}",
                digest.len()
            )));
        }
        Ok(Self {
            codec,
            hash_code,
            digest: digest.to_vec(),
        })
    }

    /// The `raw` + SHA-256 CID of `data`.
    pub fn raw_sha256(data: &[u8]) -> Self {
        Self {
            codec: multicodec::RAW,
            hash_code: multicodec::SHA2_256,
            digest: Sha256::digest(data).to_vec(),
        }
    }

    /// The piece CID for a 32-byte piece commitment.
    pub fn piece_commitment(commitment: &[u8; 32]) -> Self {
        Self {
            codec: multicodec::FIL_COMMITMENT_UNSEALED,
            hash_code: multicodec::SHA2_256_TRUNC254_PADDED,
            digest: commitment.to_vec(),
        }
    }

    /// Content codec.
    pub fn codec(&self) -> u64 {
        self.codec
    }

    /// Multihash function code.
    pub fn hash_code(&self) -> u64 {
        self.hash_code
    }

    /// Multihash digest.
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Returns the commitment bytes if this is a piece CID.
    pub fn as_piece_commitment(&self) -> Option<[u8; 32]> {
        if self.codec != multicodec::FIL_COMMITMENT_UNSEALED
            || self.hash_code != multicodec::SHA2_256_TRUNC254_PADDED
        {
            return None;
        }
        self.digest.as_slice().try_into().ok()
    }

    /// Length of the binary form.
    pub fn encoded_len(&self) -> usize {
        varint::encoded_len(CID_VERSION)
            + varint::encoded_len(self.codec)
            + varint::encoded_len(self.hash_code)
            + varint::encoded_len(self.digest.len() as u64)
            + self.digest.len()
    }

    /// Append the binary form to `out`.
    pub fn write_bytes(&self, out: &mut Vec<u8>) {
        varint::push(CID_VERSION, out);
        varint::push(self.codec, out);
        varint::push(self.hash_code, out);
        varint::push(self.digest.len() as u64, out);
        out.extend_from_slice(&self.digest);
    }

    /// The binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write_bytes(&mut out);
        out
    }

    /// Parse a CID from the front of `bytes`, returning it and the bytes consumed.
    ///
    /// # Errors
    ///
    /// Fails on truncated input, a version other than 1, or an oversized digest.
    #[allow(clippy::cast_possible_truncation)]
    pub fn read_bytes(bytes: &[u8]) -> CodecResult<(Self, usize)> {
        let mut pos = 0;
        let mut next = |bytes: &[u8]| -> CodecResult<u64> {
            let (value, n) = varint::decode(&bytes[pos..])?;
            pos += n;
            Ok(value)
        };

        let version = next(bytes)?;
        if version != CID_VERSION {
            return Err(CodecError::invalid_cid(format!(
                "unsupported CID version {version}"
            )));
        }
        let codec = next(bytes)?;
        let hash_code = next(bytes)?;
        let digest_len = next(bytes)?;
        if digest_len > MAX_DIGEST_LEN as u64 {
            return Err(CodecError::invalid_cid(format!(
                "digest of {digest_len} bytes exceeds {MAX_DIGEST_LEN}"
            )));
        }

        let end = pos + digest_len as usize;
        let digest = bytes.get(pos..end).ok_or(CodecError::UnexpectedEof)?;
        Ok((
            Self {
                codec,
                hash_code,
                digest: digest.to_vec(),
            },
            end,
        ))
    }

    /// Parse a CID occupying all of `bytes`.
    ///
    /// # Errors
    ///
    /// Fails if the bytes are not exactly one CID.
    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        let (cid, used) = Self::read_bytes(bytes)?;
        if used != bytes.len() {
            return Err(CodecError::invalid_cid("trailing bytes after CID"));
        }
        Ok(cid)
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", base32::encode(&self.to_bytes()))
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({self})")
    }
}

impl FromStr for Cid {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix('b')
            .ok_or_else(|| CodecError::invalid_cid("expected base32 multibase prefix 'b'"))?;
        Self::from_bytes(&base32::decode(body)?)
    }
}
