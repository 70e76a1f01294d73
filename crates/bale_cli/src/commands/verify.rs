//! Verify command implementation.

use super::{open_store, parse_cid, print_json};
use crate::error::{CliError, CliResult};
use crate::Format;
use bale_codec::Cid;
use bale_core::{ArchiveSegmentor, Segmentor, SegmentorConfig};
use serde::Serialize;
use std::path::Path;

/// Outcome for one segment.
#[derive(Debug, Serialize)]
pub struct VerifyResult {
    /// Segment CID.
    pub cid: String,
    /// Sections read, when the segment verified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sections: Option<u64>,
    /// Why verification failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs the verify command.
pub fn run(path: &Path, cids: &[String], format: Format) -> CliResult<()> {
    let segmentor = open_store(path, SegmentorConfig::default(), false)?;
    let targets: Vec<Cid> = if cids.is_empty() {
        segmentor
            .list_segments()?
            .iter()
            .map(|s| s.cid().clone())
            .collect()
    } else {
        cids.iter().map(|c| parse_cid(c)).collect::<CliResult<_>>()?
    };

    let results = verify_all(&segmentor, &targets);
    match format {
        Format::Json => print_json(&results)?,
        Format::Text => print_results(&results),
    }

    let failed = results.iter().filter(|r| !r.is_ok()).count();
    if failed > 0 {
        return Err(CliError::VerificationFailed {
            failed,
            checked: results.len(),
        });
    }
    Ok(())
}

fn verify_all(segmentor: &ArchiveSegmentor, cids: &[Cid]) -> Vec<VerifyResult> {
    cids.iter()
        .map(|cid| match segmentor.verify_segment(cid) {
            Ok(report) => VerifyResult {
                cid: cid.to_string(),
                sections: Some(report.sections),
                error: None,
            },
            Err(err) => VerifyResult {
                cid: cid.to_string(),
                sections: None,
                error: Some(err.to_string()),
            },
        })
        .collect()
}

fn print_results(results: &[VerifyResult]) {
    for result in results {
        match (&result.error, result.sections) {
            (Some(error), _) => println!("FAIL {}: {error}", result.cid),
            (None, sections) => println!("OK   {} ({} sections)", result.cid, sections.unwrap_or(0)),
        }
    }
    let ok = results.iter().filter(|r| r.is_ok()).count();
    println!();
    println!("{ok}/{} segments verified", results.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use bale_core::CancellationToken;
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom, Write};
    use tempfile::TempDir;

    #[test]
    fn detects_tampered_blob() {
        let dir = TempDir::new().unwrap();
        let segmentor = open_store(dir.path(), SegmentorConfig::new().chunk_size(64), true).unwrap();
        let good = segmentor
            .segment(&mut &[7u8; 300][..], &CancellationToken::new())
            .unwrap();
        let bad = segmentor
            .segment(&mut &[8u8; 300][..], &CancellationToken::new())
            .unwrap();

        let mut file = OpenOptions::new()
            .write(true)
            .open(dir.path().join(&bad.locator))
            .unwrap();
        file.seek(SeekFrom::End(-1)).unwrap();
        file.write_all(&[0]).unwrap();
        drop(file);

        let results = verify_all(&segmentor, &[good.cid().clone(), bad.cid().clone()]);
        assert!(results[0].is_ok());
        assert_eq!(results[0].sections, Some(5));
        assert!(!results[1].is_ok());
    }
}
