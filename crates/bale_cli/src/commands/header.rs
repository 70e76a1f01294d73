//! Header command implementation.

use super::print_json;
use crate::error::CliResult;
use crate::Format;
use bale_codec::archive::{ArchiveHeader, EMPTY_HEADER_V1};
use bale_core::empty_header_segment;
use serde::Serialize;

/// The empty archive header and its commitment.
#[derive(Debug, Serialize)]
pub struct HeaderResult {
    /// Encoded bytes, hex.
    pub hex: String,
    /// Encoded length.
    pub len: usize,
    /// Format version.
    pub version: u64,
    /// Number of roots.
    pub roots: usize,
    /// Commitment CID of the header segment.
    pub cid: String,
    /// Padded commitment size.
    pub size: u64,
}

/// Builds the header description.
pub fn describe() -> CliResult<HeaderResult> {
    let (header, len) = ArchiveHeader::decode(&EMPTY_HEADER_V1)?;
    let segment = empty_header_segment();
    Ok(HeaderResult {
        hex: EMPTY_HEADER_V1.iter().map(|b| format!("{b:02x}")).collect(),
        len,
        version: header.version,
        roots: header.roots.len(),
        cid: segment.cid().to_string(),
        size: segment.size().get(),
    })
}

/// Runs the header command.
pub fn run(format: Format) -> CliResult<()> {
    let result = describe()?;
    match format {
        Format::Json => print_json(&result)?,
        Format::Text => {
            println!("Empty archive header v{}", result.version);
            println!("  Bytes:  {} ({} bytes)", result.hex, result.len);
            println!("  Roots:  {}", result.roots);
            println!("  CID:    {}", result.cid);
            println!("  Size:   {}", result.size);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_fixed_header() {
        let result = describe().unwrap();
        assert_eq!(result.len, 18);
        assert_eq!(result.version, 1);
        assert_eq!(result.roots, 0);
        assert_eq!(result.size, 128);
        assert!(result.hex.starts_with("11"));
    }
}
