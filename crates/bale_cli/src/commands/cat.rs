//! Cat command implementation.

use super::{open_store, parse_cid};
use crate::error::CliResult;
use bale_core::SegmentorConfig;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Runs the cat command.
pub fn run(path: &Path, cid: &str, output: Option<&Path>) -> CliResult<()> {
    let segmentor = open_store(path, SegmentorConfig::default(), false)?;
    let cid = parse_cid(cid)?;

    let written = match output {
        Some(file) => {
            let mut out = BufWriter::new(File::create(file)?);
            let written = segmentor.copy_payload(&cid, &mut out)?;
            out.flush()?;
            written
        }
        None => {
            let mut out = BufWriter::new(io::stdout().lock());
            let written = segmentor.copy_payload(&cid, &mut out)?;
            out.flush()?;
            written
        }
    };
    debug!(%cid, bytes = written, "payload written");
    Ok(())
}
