//! Unsigned LEB128 varints as used by multiformats.
//!
//! Seven bits per byte, least significant group first, high bit set on every
//! byte except the last. Encodings must be minimal.

use std::io::{self, Read, Write};

use crate::error::{CodecError, CodecResult};

/// Longest encoding of a `u64`.
pub const MAX_LEN: usize = 10;

/// Number of bytes `value` occupies once encoded.
pub const fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    if bits == 0 {
        1
    } else {
        bits.div_ceil(7)
    }
}

/// Encode `value` into `buf`, returning the encoded prefix.
#[allow(clippy::cast_possible_truncation)]
pub fn encode(mut value: u64, buf: &mut [u8; MAX_LEN]) -> &[u8] {
    let mut i = 0;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf[i] = byte;
            return &buf[..=i];
        }
        buf[i] = byte | 0x80;
        i += 1;
    }
}

/// Append the encoding of `value` to `out`.
pub fn push(value: u64, out: &mut Vec<u8>) {
    let mut buf = [0u8; MAX_LEN];
    out.extend_from_slice(encode(value, &mut buf));
}

/// Write the encoding of `value`, returning the number of bytes written.
pub fn write<W: Write + ?Sized>(value: u64, out: &mut W) -> io::Result<usize> {
    let mut buf = [0u8; MAX_LEN];
    let bytes = encode(value, &mut buf);
    out.write_all(bytes)?;
    Ok(bytes.len())
}

/// Decode a varint from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed.
///
/// # Errors
///
/// Fails on truncated input, values wider than 64 bits, or non-minimal
/// encodings.
pub fn decode(bytes: &[u8]) -> CodecResult<(u64, usize)> {
    let mut value: u64 = 0;
    for (i, &byte) in bytes.iter().enumerate().take(MAX_LEN) {
        let group = u64::from(byte & 0x7f);
        if i == MAX_LEN - 1 && group > 1 {
            return Err(CodecError::VarintOverflow);
        }
        value |= group << (7 * i);
        if byte & 0x80 == 0 {
            if byte == 0 && i > 0 {
                return Err(CodecError::NonMinimalVarint);
            }
            return Ok((value, i + 1));
        }
    }
    if bytes.len() >= MAX_LEN {
        Err(CodecError::VarintOverflow)
    } else {
        Err(CodecError::UnexpectedEof)
    }
}

/// Read a varint from a stream.
///
/// Returns `Ok(None)` if the stream is already at end of input, which lets
/// callers tell a clean end of archive from a truncated section.
pub fn read<R: Read + ?Sized>(input: &mut R) -> CodecResult<Option<(u64, usize)>> {
    let mut buf = [0u8; MAX_LEN];
    for i in 0..MAX_LEN {
        let mut byte = [0u8; 1];
        if input.read(&mut byte)? == 0 {
            return if i == 0 {
                Ok(None)
            } else {
                Err(CodecError::UnexpectedEof)
            };
        }
        buf[i] = byte[0];
        if byte[0] & 0x80 == 0 {
            return decode(&buf[..=i]).map(Some);
        }
    }
    Err(CodecError::VarintOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_encodings() {
        let mut buf = [0u8; MAX_LEN];
        assert_eq!(encode(0, &mut buf), &[0x00]);
        assert_eq!(encode(1, &mut buf), &[0x01]);
        assert_eq!(encode(127, &mut buf), &[0x7f]);
        assert_eq!(encode(128, &mut buf), &[0x80, 0x01]);
        assert_eq!(encode(300, &mut buf), &[0xac, 0x02]);
        assert_eq!(encode(0xf101, &mut buf), &[0x81, 0xe2, 0x03]);
        assert_eq!(encode(0x1012, &mut buf), &[0x92, 0x20]);
    }

    #[test]
    fn half_mebibyte_section_prefix_is_three_bytes() {
        assert_eq!(encoded_len(512 * 1024 + 36), 3);
        assert_eq!(encoded_len(1024 * 1024 + 36), 3);
        assert_eq!(encoded_len(17), 1);
        assert_eq!(encoded_len(u64::MAX), MAX_LEN);
    }

    #[test]
    fn rejects_non_minimal() {
        assert_eq!(decode(&[0x80, 0x00]), Err(CodecError::NonMinimalVarint));
        assert_eq!(decode(&[0x81, 0x80, 0x00]), Err(CodecError::NonMinimalVarint));
    }

    #[test]
    fn rejects_truncated_and_overflow() {
        assert_eq!(decode(&[0x80]), Err(CodecError::UnexpectedEof));
        assert_eq!(decode(&[]), Err(CodecError::UnexpectedEof));
        let too_wide = [0xff; 10];
        assert_eq!(decode(&too_wide), Err(CodecError::VarintOverflow));
        let mut over = [0xff; 10];
        over[9] = 0x02;
        assert_eq!(decode(&over), Err(CodecError::VarintOverflow));
    }

    #[test]
    fn read_distinguishes_clean_eof() {
        let mut empty: &[u8] = &[];
        assert_eq!(read(&mut empty).unwrap(), None);

        let mut truncated: &[u8] = &[0x80];
        assert_eq!(read(&mut truncated), Err(CodecError::UnexpectedEof));

        let mut ok: &[u8] = &[0xac, 0x02, 0xff];
        assert_eq!(read(&mut ok).unwrap(), Some((300, 2)));
        assert_eq!(ok, &[0xff]);
    }

    proptest! {
        #[test]
        fn encode_decode(value in any::<u64>()) {
            let mut out = Vec::new();
            push(value, &mut out);
            prop_assert_eq!(out.len(), encoded_len(value));
            prop_assert_eq!(decode(&out).unwrap(), (value, out.len()));
        }
    }
}
