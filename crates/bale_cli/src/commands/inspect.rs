//! Inspect command implementation.

use super::{open_store, parse_cid, print_json, SegmentRow};
use crate::error::CliResult;
use crate::Format;
use bale_codec::archive::SectionReader;
use bale_core::{Retriever, Segmentor, SegmentorConfig};
use serde::Serialize;
use std::path::Path;

/// Segment inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Segment metadata.
    #[serde(flatten)]
    pub segment: SegmentRow,
    /// Blob name in the store.
    pub locator: String,
    /// Number of sections in the archive.
    pub section_count: usize,
    /// Per-section layout (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sections: Option<Vec<SectionInfo>>,
}

/// Layout of a single section.
#[derive(Debug, Serialize)]
pub struct SectionInfo {
    /// Byte offset of the section in the archive.
    pub offset: u64,
    /// Encoded length including prefix and CID.
    pub encoded_len: u64,
    /// Payload length.
    pub payload_len: u64,
    /// Payload CID.
    pub cid: String,
}

/// Runs the inspect command.
pub fn run(path: &Path, cid: &str, show_sections: bool, format: Format) -> CliResult<()> {
    let segmentor = open_store(path, SegmentorConfig::default(), false)?;
    let cid = parse_cid(cid)?;
    let segment = segmentor.get_segment(&cid)?;

    let mut reader = SectionReader::new(segmentor.retrieve(&cid)?, segment.raw_size.max(1));
    let mut sections = Vec::new();
    loop {
        let offset = reader.offset();
        let Some(section) = reader.next() else {
            break;
        };
        let section = section?;
        sections.push(SectionInfo {
            offset,
            encoded_len: reader.offset() - offset,
            payload_len: section.payload.len() as u64,
            cid: section.cid.to_string(),
        });
    }

    let result = InspectResult {
        segment: SegmentRow::from(segment.as_ref()),
        locator: segment.locator.clone(),
        section_count: sections.len(),
        sections: show_sections.then_some(sections),
    };

    match format {
        Format::Json => print_json(&result)?,
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Segment {}", result.segment.cid);
    println!("  Locator:        {}", result.locator);
    println!("  Padded size:    {}", result.segment.size);
    println!("  Raw size:       {}", result.segment.raw_size);
    println!("  Segmented size: {}", result.segment.segmented_size);
    println!("  Created at:     {}", result.segment.created_at);
    println!("  Sections:       {}", result.section_count);

    if let Some(sections) = &result.sections {
        println!();
        println!("  {:>12}  {:>10}  {:>10}  CID", "OFFSET", "ENCODED", "PAYLOAD");
        for section in sections {
            println!(
                "  {:>12}  {:>10}  {:>10}  {}",
                section.offset, section.encoded_len, section.payload_len, section.cid
            );
        }
    }
}
