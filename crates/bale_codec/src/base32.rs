//! RFC 4648 base32, lowercase alphabet, no padding.
//!
//! This is the `b` multibase used for the text form of CIDs.

use crate::error::{CodecError, CodecResult};

const ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Encode bytes as unpadded lowercase base32.
pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(char::from(ALPHABET[((buffer >> bits) & 0x1f) as usize]));
        }
    }
    if bits > 0 {
        out.push(char::from(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize]));
    }
    out
}

/// Decode unpadded base32. Uppercase input is accepted.
///
/// # Errors
///
/// Returns [`CodecError::InvalidBase32`] for characters outside the alphabet.
#[allow(clippy::cast_possible_truncation)]
pub fn decode(text: &str) -> CodecResult<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for c in text.chars() {
        let index = match c.to_ascii_lowercase() {
            l @ 'a'..='z' => l as u32 - 'a' as u32,
            d @ '2'..='7' => d as u32 - '2' as u32 + 26,
            _ => return Err(CodecError::InvalidBase32(c)),
        };
        buffer = (buffer << 5) | index;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc4648_vectors() {
        assert_eq!(encode(b""), "");
        assert_eq!(encode(b"f"), "my");
        assert_eq!(encode(b"fo"), "mzxq");
        assert_eq!(encode(b"foo"), "mzxw6");
        assert_eq!(encode(b"foob"), "mzxw6yq");
        assert_eq!(encode(b"fooba"), "mzxw6ytb");
        assert_eq!(encode(b"foobar"), "mzxw6ytboi");
    }

    #[test]
    fn decode_vectors() {
        assert_eq!(decode("mzxw6ytboi").unwrap(), b"foobar");
        assert_eq!(decode("MZXW6").unwrap(), b"foo");
        assert_eq!(decode("my").unwrap(), b"f");
    }

    #[test]
    fn decode_rejects_foreign_characters() {
        assert_eq!(decode("mz1"), Err(CodecError::InvalidBase32('1')));
        assert_eq!(decode("mz="), Err(CodecError::InvalidBase32('=')));
    }
}
