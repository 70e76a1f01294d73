//! Canonical CBOR encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Encode a value to canonical CBOR bytes.
///
/// Output is deterministic:
/// - Map keys are sorted by their encoded form (length-first, then bytewise)
/// - Integers and lengths use the shortest possible encoding
/// - No indefinite-length encoding
///
/// Deal proposals are signed over these bytes, so two encodings of the same
/// value must never differ.
///
/// # Errors
///
/// Returns an error if a map contains the same key twice.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// A canonical CBOR encoder.
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encode a value.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => {
                self.buffer.push(0xf6);
                Ok(())
            }
            Value::Bool(b) => {
                self.buffer.push(if *b { 0xf5 } else { 0xf4 });
                Ok(())
            }
            Value::Integer(n) => {
                self.encode_integer(*n);
                Ok(())
            }
            Value::Bytes(b) => {
                self.encode_head(2, b.len() as u64);
                self.buffer.extend_from_slice(b);
                Ok(())
            }
            Value::Text(s) => {
                self.encode_head(3, s.len() as u64);
                self.buffer.extend_from_slice(s.as_bytes());
                Ok(())
            }
            Value::Array(items) => {
                self.encode_head(4, items.len() as u64);
                for item in items {
                    self.encode(item)?;
                }
                Ok(())
            }
            Value::Map(pairs) => self.encode_map(pairs),
            Value::Tag(tag, inner) => {
                self.encode_head(6, *tag);
                self.encode(inner)
            }
        }
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.encode_head(0, n as u64);
        } else {
            // -1 encodes as 0, -2 as 1, and so on.
            self.encode_head(1, (-(n + 1)) as u64);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_head(&mut self, major_type: u8, value: u64) {
        let mt = major_type << 5;

        if value < 24 {
            self.buffer.push(mt | (value as u8));
        } else if u8::try_from(value).is_ok() {
            self.buffer.push(mt | 24);
            self.buffer.push(value as u8);
        } else if u16::try_from(value).is_ok() {
            self.buffer.push(mt | 25);
            self.buffer.extend_from_slice(&(value as u16).to_be_bytes());
        } else if u32::try_from(value).is_ok() {
            self.buffer.push(mt | 26);
            self.buffer.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn encode_map(&mut self, pairs: &[(Value, Value)]) -> CodecResult<()> {
        let mut encoded: Vec<(Vec<u8>, &Value)> = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            encoded.push((to_canonical_cbor(key)?, value));
        }

        encoded.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));
        if encoded.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(CodecError::encoding_failed("duplicate map key"));
        }

        self.encode_head(5, pairs.len() as u64);
        for (key, value) in encoded {
            self.buffer.extend_from_slice(&key);
            self.encode(value)?;
        }
        Ok(())
    }
}

impl Default for CanonicalEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_simple_values() {
        assert_eq!(to_canonical_cbor(&Value::Null).unwrap(), vec![0xf6]);
        assert_eq!(to_canonical_cbor(&Value::Bool(false)).unwrap(), vec![0xf4]);
        assert_eq!(to_canonical_cbor(&Value::Bool(true)).unwrap(), vec![0xf5]);
    }

    #[test]
    fn encode_integers_shortest_form() {
        assert_eq!(to_canonical_cbor(&Value::Integer(23)).unwrap(), vec![0x17]);
        assert_eq!(to_canonical_cbor(&Value::Integer(24)).unwrap(), vec![0x18, 24]);
        assert_eq!(
            to_canonical_cbor(&Value::Integer(256)).unwrap(),
            vec![0x19, 0x01, 0x00]
        );
        assert_eq!(
            to_canonical_cbor(&Value::Integer(518_400)).unwrap(),
            vec![0x1a, 0x00, 0x07, 0xe9, 0x00]
        );
        assert_eq!(to_canonical_cbor(&Value::Integer(-1)).unwrap(), vec![0x20]);
        assert_eq!(
            to_canonical_cbor(&Value::Integer(-500)).unwrap(),
            vec![0x39, 0x01, 0xf3]
        );
    }

    #[test]
    fn encode_text_and_bytes() {
        assert_eq!(
            to_canonical_cbor(&Value::text("roots")).unwrap(),
            vec![0x65, b'r', b'o', b'o', b't', b's']
        );
        assert_eq!(
            to_canonical_cbor(&Value::Bytes(vec![1, 2])).unwrap(),
            vec![0x42, 1, 2]
        );
    }

    #[test]
    fn map_keys_sorted_length_first() {
        let value = Value::map(vec![
            (Value::text("bb"), Value::Integer(2)),
            (Value::text("c"), Value::Integer(3)),
            (Value::text("a"), Value::Integer(1)),
        ]);
        let bytes = to_canonical_cbor(&value).unwrap();
        assert_eq!(
            bytes,
            vec![0xa3, 0x61, b'a', 0x01, 0x61, b'c', 0x03, 0x62, b'b', b'b', 0x02]
        );
    }

    #[test]
    fn duplicate_keys_rejected() {
        let value = Value::map(vec![
            (Value::text("a"), Value::Integer(1)),
            (Value::text("a"), Value::Integer(2)),
        ]);
        assert!(matches!(
            to_canonical_cbor(&value),
            Err(CodecError::EncodingFailed { .. })
        ));
    }

    #[test]
    fn encode_tag() {
        let value = Value::Tag(42, Box::new(Value::Bytes(vec![0])));
        assert_eq!(to_canonical_cbor(&value).unwrap(), vec![0xd8, 0x2a, 0x41, 0x00]);
    }
}
