//! Persistent segment index.
//!
//! The segmentor keeps its index in a `SEGMENTS` blob next to the segment
//! archives, encoded as canonical CBOR:
//!
//! ```text
//! { "version": 1,
//!   "segments": [ { "cid": bytes, "size": uint, "raw": uint,
//!                   "encoded": uint, "created_ms": uint, "locator": text } ] }
//! ```
//!
//! Entries are written in commitment order, so the same index always encodes
//! to the same bytes.

use crate::error::{CoreError, CoreResult};
use crate::piece::{PaddedPieceSize, PieceInfo};
use crate::segment::Segment;
use bale_codec::{from_cbor, to_canonical_cbor, Cid, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Blob name of the manifest.
pub const MANIFEST_NAME: &str = "SEGMENTS";

/// Current manifest version.
pub const MANIFEST_VERSION: i64 = 1;

/// Encodes segments, which must already be in commitment order.
///
/// # Errors
///
/// Propagates CBOR encoding failures.
pub fn encode<'a>(segments: impl IntoIterator<Item = &'a Segment>) -> CoreResult<Vec<u8>> {
    let entries = segments.into_iter().map(encode_segment).collect();
    let manifest = Value::map(vec![
        (Value::text("version"), Value::Integer(MANIFEST_VERSION)),
        (Value::text("segments"), Value::Array(entries)),
    ]);
    Ok(to_canonical_cbor(&manifest)?)
}

fn encode_segment(segment: &Segment) -> Value {
    let created_ms = segment
        .created_at
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0);
    Value::map(vec![
        (Value::text("cid"), Value::Bytes(segment.info.cid.to_bytes())),
        (Value::text("size"), Value::unsigned(segment.info.size.get())),
        (Value::text("raw"), Value::unsigned(segment.raw_size)),
        (Value::text("encoded"), Value::unsigned(segment.segmented_size)),
        (Value::text("created_ms"), Value::unsigned(created_ms)),
        (Value::text("locator"), Value::text(segment.locator.clone())),
    ])
}

/// Decodes a manifest blob.
///
/// # Errors
///
/// Returns [`CoreError::InvalidManifest`] for unknown versions or missing
/// fields, and codec errors for malformed CBOR.
pub fn decode(bytes: &[u8]) -> CoreResult<Vec<Segment>> {
    let value = from_cbor(bytes)?;
    match value.get("version").and_then(Value::as_integer) {
        Some(MANIFEST_VERSION) => {}
        Some(other) => {
            return Err(CoreError::invalid_manifest(format!(
                "unsupported manifest version {other}"
            )))
        }
        None => return Err(CoreError::invalid_manifest("missing version")),
    }

    value
        .get("segments")
        .and_then(Value::as_array)
        .ok_or_else(|| CoreError::invalid_manifest("missing segments"))?
        .iter()
        .map(decode_segment)
        .collect()
}

#[allow(clippy::cast_sign_loss)]
fn decode_segment(entry: &Value) -> CoreResult<Segment> {
    let uint = |name: &str| -> CoreResult<u64> {
        entry
            .get(name)
            .and_then(Value::as_integer)
            .filter(|n| *n >= 0)
            .map(|n| n as u64)
            .ok_or_else(|| CoreError::invalid_manifest(format!("segment entry missing {name}")))
    };

    let cid_bytes = entry
        .get("cid")
        .and_then(Value::as_bytes)
        .ok_or_else(|| CoreError::invalid_manifest("segment entry missing cid"))?;
    let locator = entry
        .get("locator")
        .and_then(Value::as_text)
        .ok_or_else(|| CoreError::invalid_manifest("segment entry missing locator"))?;

    Ok(Segment {
        info: PieceInfo {
            cid: Cid::from_bytes(cid_bytes)?,
            size: PaddedPieceSize::new(uint("size")?)?,
        },
        raw_size: uint("raw")?,
        segmented_size: uint("encoded")?,
        created_at: SystemTime::UNIX_EPOCH + Duration::from_millis(uint("created_ms")?),
        locator: locator.to_string(),
    })
}
