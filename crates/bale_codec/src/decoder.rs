//! Canonical CBOR decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Decode a single value from CBOR bytes.
///
/// Trailing bytes after the value are an error; use [`CanonicalDecoder`]
/// directly to decode a value embedded in a larger buffer.
///
/// # Errors
///
/// Returns an error if the bytes are not valid canonical CBOR or contain
/// forbidden constructs (floats, indefinite-length items).
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::invalid_structure("trailing bytes after value"));
    }
    Ok(value)
}

/// A canonical CBOR decoder.
///
/// Validates that input follows canonical CBOR rules and rejects
/// forbidden constructs.
pub struct CanonicalDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

/// Upper bound on array and map element counts accepted from input.
const MAX_CONTAINER_ELEMENTS: u64 = 1024 * 1024;

/// Upper bound on byte and text string lengths accepted from input.
const MAX_BYTES_LENGTH: u64 = 16 * 1024 * 1024;

impl<'a> CanonicalDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Decode the next value.
    #[allow(clippy::cast_possible_wrap)]
    pub fn decode(&mut self) -> CodecResult<Value> {
        let initial_byte = self.read_byte()?;
        let major_type = initial_byte >> 5;
        let additional_info = initial_byte & 0x1f;

        match major_type {
            0 => {
                let n = self.decode_unsigned(additional_info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::invalid_structure("integer exceeds i64"))
            }
            1 => {
                let n = self.decode_unsigned(additional_info)?;
                i64::try_from(n)
                    .map(|n| Value::Integer(-n - 1))
                    .map_err(|_| CodecError::invalid_structure("integer exceeds i64"))
            }
            2 => {
                let len = self.decode_length(additional_info, MAX_BYTES_LENGTH)?;
                Ok(Value::Bytes(self.read_bytes(len)?.to_vec()))
            }
            3 => {
                let len = self.decode_length(additional_info, MAX_BYTES_LENGTH)?;
                let bytes = self.read_bytes(len)?;
                let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Value::Text(text.to_string()))
            }
            4 => self.decode_array(additional_info),
            5 => self.decode_map(additional_info),
            6 => {
                let tag = self.decode_unsigned(additional_info)?;
                Ok(Value::Tag(tag, Box::new(self.decode()?)))
            }
            7 => self.decode_simple(additional_info),
            _ => Err(CodecError::invalid_structure("invalid major type")),
        }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let bytes = self.data.get(self.pos..end).ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(bytes)
    }

    fn decode_unsigned(&mut self, additional_info: u8) -> CodecResult<u64> {
        let (value, minimum) = match additional_info {
            0..=23 => return Ok(u64::from(additional_info)),
            24 => (u64::from(self.read_byte()?), 24),
            25 => {
                let b = self.read_bytes(2)?;
                (u64::from(u16::from_be_bytes([b[0], b[1]])), 0x100)
            }
            26 => {
                let b = self.read_bytes(4)?;
                (
                    u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
                    0x1_0000,
                )
            }
            27 => {
                let b = self.read_bytes(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                (u64::from_be_bytes(raw), 0x1_0000_0000)
            }
            31 => return Err(CodecError::IndefiniteLengthForbidden),
            _ => return Err(CodecError::invalid_structure("reserved additional info")),
        };
        if value < minimum {
            return Err(CodecError::invalid_structure(
                "non-canonical: value could be encoded in fewer bytes",
            ));
        }
        Ok(value)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn decode_length(&mut self, additional_info: u8, max_allowed: u64) -> CodecResult<usize> {
        let claimed = self.decode_unsigned(additional_info)?;
        if claimed > max_allowed {
            return Err(CodecError::SizeLimitExceeded {
                claimed,
                max_allowed,
            });
        }
        Ok(claimed as usize)
    }

    fn decode_array(&mut self, additional_info: u8) -> CodecResult<Value> {
        let len = self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)?;
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(self.decode()?);
        }
        Ok(Value::Array(items))
    }

    fn decode_map(&mut self, additional_info: u8) -> CodecResult<Value> {
        let len = self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)?;
        let mut pairs = Vec::with_capacity(len.min(1024));
        let data = self.data;
        let mut prev_key: Option<&'a [u8]> = None;

        for _ in 0..len {
            let key_start = self.pos;
            let key = self.decode()?;
            let key_bytes = &data[key_start..self.pos];

            if let Some(prev) = prev_key {
                let ordering = prev.len().cmp(&key_bytes.len()).then_with(|| prev.cmp(key_bytes));
                if ordering != std::cmp::Ordering::Less {
                    return Err(CodecError::invalid_structure(
                        "non-canonical: map keys not in sorted order",
                    ));
                }
            }
            prev_key = Some(key_bytes);

            let value = self.decode()?;
            pairs.push((key, value));
        }

        Ok(Value::Map(pairs))
    }

    fn decode_simple(&mut self, additional_info: u8) -> CodecResult<Value> {
        match additional_info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            25..=27 => Err(CodecError::FloatForbidden),
            31 => Err(CodecError::invalid_structure("break without indefinite")),
            other => Err(CodecError::invalid_structure(format!(
                "unsupported simple value {other}"
            ))),
        }
    }
}
