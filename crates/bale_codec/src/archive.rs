//! Archive framing.
//!
//! A segment is a CARv1-style archive without a header: a run of sections,
//! each holding one chunk of the original stream.
//!
//! ```text
//! | varint(36 + N) | CIDv1 raw sha2-256 of payload (36) | payload (N) |
//! ```
//!
//! The header is stored once, out of band, as [`EMPTY_HEADER_V1`].

use std::io::{self, Read, Write};

use sha2::{Digest, Sha256};

use crate::cid::{multicodec, Cid};
use crate::decoder::CanonicalDecoder;
use crate::encoder::to_canonical_cbor;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use crate::{varint, CID_LINK_TAG};

/// Encoded length of the CID in every section.
pub const SECTION_CID_LEN: usize = 36;

/// Prefix of every section CID: version 1, raw codec, sha2-256, 32-byte digest.
pub const SECTION_CID_PREFIX: [u8; 4] = [0x01, 0x55, 0x12, 0x20];

/// The empty version 1 archive header, length prefix included.
///
/// Canonical CBOR for `{"roots": null, "version": 1}` preceded by its
/// varint length (17).
pub const EMPTY_HEADER_V1: [u8; 18] = [
    0x11, 0xa2, 0x65, b'r', b'o', b'o', b't', b's', 0xf6, 0x67, b'v', b'e', b'r', b's', b'i', b'o',
    b'n', 0x01,
];

/// Total encoded size of a section carrying `payload_len` bytes.
pub fn section_len(payload_len: u64) -> u64 {
    let body = SECTION_CID_LEN as u64 + payload_len;
    varint::encoded_len(body) as u64 + body
}

/// Frame `payload` as one section and write it to `out`.
///
/// Returns the number of bytes written.
pub fn write_section<W: Write + ?Sized>(payload: &[u8], out: &mut W) -> io::Result<u64> {
    let mut head = Vec::with_capacity(varint::MAX_LEN + SECTION_CID_LEN);
    varint::push((SECTION_CID_LEN + payload.len()) as u64, &mut head);
    head.extend_from_slice(&SECTION_CID_PREFIX);
    head.extend_from_slice(&Sha256::digest(payload));

    out.write_all(&head)?;
    out.write_all(payload)?;
    Ok((head.len() + payload.len()) as u64)
}

/// A decoded section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// CID recorded in the section.
    pub cid: Cid,
    /// Chunk bytes.
    pub payload: Vec<u8>,
}

impl Section {
    /// Build a section for `payload`, computing its CID.
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            cid: Cid::raw_sha256(&payload),
            payload,
        }
    }

    /// Encoded form of this section.
    pub fn encode(&self) -> Vec<u8> {
        let cid = self.cid.to_bytes();
        let mut out = Vec::with_capacity(varint::MAX_LEN + cid.len() + self.payload.len());
        varint::push((cid.len() + self.payload.len()) as u64, &mut out);
        out.extend_from_slice(&cid);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse one section from the front of `bytes`.
    ///
    /// Returns the section and the number of bytes consumed. The payload
    /// hash is not checked; call [`Section::verify`] for that.
    ///
    /// # Errors
    ///
    /// Fails on truncated input or a malformed CID.
    #[allow(clippy::cast_possible_truncation)]
    pub fn parse(bytes: &[u8]) -> CodecResult<(Self, usize)> {
        let (body_len, prefix) = varint::decode(bytes)?;
        let end = prefix
            .checked_add(usize::try_from(body_len).map_err(|_| CodecError::UnexpectedEof)?)
            .ok_or(CodecError::UnexpectedEof)?;
        let body = bytes.get(prefix..end).ok_or(CodecError::UnexpectedEof)?;
        let (cid, cid_len) = Cid::read_bytes(body)?;
        Ok((
            Self {
                cid,
                payload: body[cid_len..].to_vec(),
            },
            end,
        ))
    }

    /// Check that the payload hashes to the recorded CID.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::HashMismatch`] on disagreement.
    pub fn verify(&self) -> CodecResult<()> {
        if self.cid.codec() != multicodec::RAW || self.cid.hash_code() != multicodec::SHA2_256 {
            return Err(CodecError::invalid_cid(format!(
                "section CID {} is not raw sha2-256",
                self.cid
            )));
        }
        let computed = Sha256::digest(&self.payload);
        if computed.as_slice() != self.cid.digest() {
            return Err(CodecError::HashMismatch {
                declared: self.cid.to_string(),
                computed: Cid::raw_sha256(&self.payload).to_string(),
            });
        }
        Ok(())
    }
}

/// Streams sections out of a reader, verifying each payload.
pub struct SectionReader<R> {
    inner: R,
    max_body_len: u64,
    offset: u64,
    failed: bool,
}

impl<R: Read> SectionReader<R> {
    /// Wrap a reader positioned at the first section.
    ///
    /// `max_payload_len` bounds the allocation made for any one section.
    pub fn new(inner: R, max_payload_len: u64) -> Self {
        Self {
            inner,
            max_body_len: max_payload_len.saturating_add(SECTION_CID_LEN as u64),
            offset: 0,
            failed: false,
        }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[allow(clippy::cast_possible_truncation)]
    fn next_section(&mut self) -> CodecResult<Option<Section>> {
        let Some((body_len, prefix)) = varint::read(&mut self.inner)? else {
            return Ok(None);
        };
        if body_len > self.max_body_len {
            return Err(CodecError::SectionTooLarge {
                len: body_len,
                max: self.max_body_len,
            });
        }
        let mut body = vec![0u8; body_len as usize];
        self.inner.read_exact(&mut body)?;

        let (cid, cid_len) = Cid::read_bytes(&body)?;
        body.drain(..cid_len);
        let section = Section { cid, payload: body };
        section.verify()?;

        self.offset += prefix as u64 + body_len;
        Ok(Some(section))
    }
}

impl<R: Read> Iterator for SectionReader<R> {
    type Item = CodecResult<Section>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_section() {
            Ok(section) => section.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// A decoded archive header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHeader {
    /// Root CIDs. Encoded as null when empty.
    pub roots: Vec<Cid>,
    /// Format version.
    pub version: u64,
}

impl ArchiveHeader {
    /// The rootless version 1 header.
    pub fn empty_v1() -> Self {
        Self {
            roots: Vec::new(),
            version: 1,
        }
    }

    fn to_value(&self) -> Value {
        let roots = if self.roots.is_empty() {
            Value::Null
        } else {
            Value::Array(
                self.roots
                    .iter()
                    .map(|cid| {
                        let mut link = vec![0u8];
                        cid.write_bytes(&mut link);
                        Value::Tag(CID_LINK_TAG, Box::new(Value::Bytes(link)))
                    })
                    .collect(),
            )
        };
        Value::map(vec![
            (Value::text("roots"), roots),
            (Value::text("version"), Value::unsigned(self.version)),
        ])
    }

    /// Length-prefixed encoding of this header.
    ///
    /// # Errors
    ///
    /// Propagates CBOR encoding failures.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let body = to_canonical_cbor(&self.to_value())?;
        let mut out = Vec::with_capacity(varint::MAX_LEN + body.len());
        varint::push(body.len() as u64, &mut out);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode a length-prefixed header from the front of `bytes`.
    ///
    /// Returns the header and the bytes consumed.
    ///
    /// # Errors
    ///
    /// Fails on truncated or malformed input.
    #[allow(clippy::cast_sign_loss)]
    pub fn decode(bytes: &[u8]) -> CodecResult<(Self, usize)> {
        let (body_len, prefix) = varint::decode(bytes)?;
        let end = usize::try_from(body_len)
            .ok()
            .and_then(|len| prefix.checked_add(len))
            .ok_or(CodecError::UnexpectedEof)?;
        let body = bytes.get(prefix..end).ok_or(CodecError::UnexpectedEof)?;

        let mut decoder = CanonicalDecoder::new(body);
        let value = decoder.decode()?;
        if !decoder.is_empty() {
            return Err(CodecError::invalid_structure("trailing bytes in header"));
        }

        let version = value
            .get("version")
            .and_then(Value::as_integer)
            .filter(|v| *v >= 0)
            .ok_or_else(|| CodecError::invalid_structure("header missing version"))?
            as u64;

        let roots = match value.get("roots") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Tag(CID_LINK_TAG, inner) => match inner.as_bytes() {
                        Some([0, rest @ ..]) => Cid::from_bytes(rest),
                        _ => Err(CodecError::invalid_cid("malformed CID link")),
                    },
                    _ => Err(CodecError::invalid_structure("root is not a CID link")),
                })
                .collect::<CodecResult<Vec<_>>>()?,
            Some(_) => return Err(CodecError::invalid_structure("roots must be an array")),
        };

        Ok((Self { roots, version }, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_header_matches_constant() {
        let encoded = ArchiveHeader::empty_v1().encode().unwrap();
        assert_eq!(encoded, EMPTY_HEADER_V1);

        let (header, used) = ArchiveHeader::decode(&EMPTY_HEADER_V1).unwrap();
        assert_eq!(header, ArchiveHeader::empty_v1());
        assert_eq!(used, EMPTY_HEADER_V1.len());
    }

    #[test]
    fn header_with_roots() {
        let header = ArchiveHeader {
            roots: vec![Cid::raw_sha256(b"root")],
            version: 1,
        };
        let encoded = header.encode().unwrap();
        let (decoded, used) = ArchiveHeader::decode(&encoded).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(used, encoded.len());
    }

    #[test]
    fn write_section_layout() {
        let payload = vec![0xabu8; 1000];
        let mut out = Vec::new();
        let written = write_section(&payload, &mut out).unwrap();

        assert_eq!(written, out.len() as u64);
        assert_eq!(written, section_len(1000));
        assert_eq!(&out[..2], &[0x8c, 0x08]); // 1036
        assert_eq!(&out[2..6], &SECTION_CID_PREFIX);
        assert_eq!(out, Section::new(payload).encode());
    }

    #[test]
    fn half_mebibyte_overhead() {
        assert_eq!(section_len(512 * 1024), 512 * 1024 + 39);
        assert_eq!(section_len(1024 * 1024), 1024 * 1024 + 39);
    }

    #[test]
    fn parse_and_verify() {
        let section = Section::new(b"chunk".to_vec());
        let mut bytes = section.encode();
        let (parsed, used) = Section::parse(&bytes).unwrap();
        assert_eq!(parsed, section);
        assert_eq!(used, bytes.len());
        parsed.verify().unwrap();

        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let (tampered, _) = Section::parse(&bytes).unwrap();
        assert!(matches!(
            tampered.verify(),
            Err(CodecError::HashMismatch { .. })
        ));
    }

    #[test]
    fn parse_truncated() {
        let bytes = Section::new(b"chunk".to_vec()).encode();
        assert_eq!(
            Section::parse(&bytes[..bytes.len() - 1]),
            Err(CodecError::UnexpectedEof)
        );
    }

    #[test]
    fn reader_streams_sections() {
        let mut stream = Vec::new();
        for chunk in [&b"one"[..], b"two", b"three"] {
            write_section(chunk, &mut stream).unwrap();
        }

        let mut reader = SectionReader::new(stream.as_slice(), 16);
        let payloads: Vec<Vec<u8>> = reader
            .by_ref()
            .map(|s| s.unwrap().payload)
            .collect();
        assert_eq!(payloads, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
        assert_eq!(reader.offset(), stream.len() as u64);
    }

    #[test]
    fn reader_stops_after_error() {
        let mut stream = Vec::new();
        write_section(b"fine", &mut stream).unwrap();
        write_section(&[0u8; 64], &mut stream).unwrap();

        let mut reader = SectionReader::new(stream.as_slice(), 8);
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(
            reader.next(),
            Some(Err(CodecError::SectionTooLarge { .. }))
        ));
        assert!(reader.next().is_none());
    }
}
