//! Known-answer vectors for archive framing and piece sizing.
//!
//! Other implementations of the archive format can load these as JSON via
//! [`vectors_json`] and check their own output against them.

use bale_codec::archive::EMPTY_HEADER_V1;
use serde::{Deserialize, Serialize};

/// A vector mapping one number to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Input value.
    pub input: u64,
    /// Expected output.
    pub expected: u64,
}

impl SizeVector {
    fn new(id: &str, description: &str, input: u64, expected: u64) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            input,
            expected,
        }
    }
}

/// Every vector set, keyed by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSet {
    /// Empty archive header, hex-encoded.
    pub empty_header_hex: String,
    /// Payload length to encoded section length.
    pub section_len: Vec<SizeVector>,
    /// Input length to padded commitment size.
    pub padded_size: Vec<SizeVector>,
}

/// Payload length to encoded section length.
pub fn section_len_vectors() -> Vec<SizeVector> {
    vec![
        SizeVector::new("section_empty", "Empty payload: prefix and CID only", 0, 37),
        SizeVector::new("section_one", "One byte payload", 1, 38),
        SizeVector::new("section_91", "Largest payload with a 1-byte prefix", 91, 128),
        SizeVector::new("section_92", "Smallest payload with a 2-byte prefix", 92, 130),
        SizeVector::new("section_half_mib", "Half MiB payload", 512 * 1024, 512 * 1024 + 39),
        SizeVector::new("section_one_mib", "One MiB payload", 1024 * 1024, 1024 * 1024 + 39),
    ]
}

/// Input length to padded commitment size.
pub fn padded_size_vectors() -> Vec<SizeVector> {
    vec![
        SizeVector::new("padded_empty", "Empty input pads to the minimum", 0, 128),
        SizeVector::new("padded_100", "Short input pads to the minimum", 100, 128),
        SizeVector::new("padded_200", "Two leaves of content", 200, 256),
        SizeVector::new("padded_300", "Rounds up to the next power of two", 300, 512),
        SizeVector::new("padded_1000", "Fr32 expansion stays under 1 KiB", 1000, 1024),
    ]
}

/// Hex encoding of the empty version 1 archive header.
pub fn empty_header_hex() -> String {
    hex_encode(&EMPTY_HEADER_V1)
}

/// All vectors.
pub fn all_vectors() -> VectorSet {
    VectorSet {
        empty_header_hex: empty_header_hex(),
        section_len: section_len_vectors(),
        padded_size: padded_size_vectors(),
    }
}

/// All vectors as pretty JSON.
pub fn vectors_json() -> String {
    serde_json::to_string_pretty(&all_vectors()).expect("Vectors always serialize")
}

/// Lowercase hex of `bytes`.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bale_codec::archive::section_len;
    use bale_core::piece_commitment;

    #[test]
    fn section_vectors_hold() {
        for vector in section_len_vectors() {
            assert_eq!(section_len(vector.input), vector.expected, "{}", vector.id);
        }
    }

    #[test]
    fn padded_size_vectors_hold() {
        for vector in padded_size_vectors() {
            let data = vec![0xA5u8; vector.input as usize];
            let info = piece_commitment(&data).unwrap();
            assert_eq!(info.size.get(), vector.expected, "{}", vector.id);
        }
    }

    #[test]
    fn header_vector() {
        let hex = empty_header_hex();
        assert_eq!(hex.len(), 36);
        assert!(hex.starts_with("11"));
    }

    #[test]
    fn json_round_trip() {
        let parsed: VectorSet = serde_json::from_str(&vectors_json()).unwrap();
        assert_eq!(parsed.section_len, section_len_vectors());
    }
}
