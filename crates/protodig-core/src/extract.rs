//! Scan-to-source pipeline.
//!
//! Every candidate from a [`ScannedFile`] is decoded, validated and rendered
//! on its own. A candidate that fails never affects the others; its error is
//! reported next to its byte range.

use crate::error::{Error, Result};
use crate::proto::{ProtoReconstructor, ReconstructorConfig, RenderedFile};
use crate::scanner::{CandidateRange, ScannedFile};
use tracing::{debug, trace};

/// Outcome for one candidate
#[derive(Debug)]
pub struct Extraction {
    /// Where the candidate was found
    pub range: CandidateRange,
    /// The rendered file, or why the candidate was rejected
    pub result: Result<RenderedFile>,
}

impl Extraction {
    /// True if the candidate rendered
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Renders every candidate in `file`, in buffer order
pub fn extract(file: &ScannedFile, config: &ReconstructorConfig) -> Vec<Extraction> {
    file.candidates()
        .iter()
        .map(|&range| {
            let result = render_candidate(file, range, config);
            match &result {
                Ok(rendered) => trace!(
                    "Rendered {} from bytes {}..{}",
                    rendered.source_name,
                    range.start,
                    range.end()
                ),
                Err(e) => debug!(
                    "Skipping candidate at bytes {}..{}: {}",
                    range.start,
                    range.end(),
                    e
                ),
            }
            Extraction { range, result }
        })
        .collect()
}

fn render_candidate(
    file: &ScannedFile,
    range: CandidateRange,
    config: &ReconstructorConfig,
) -> Result<RenderedFile> {
    if range.end() > file.data().len() {
        return Err(Error::invalid_wire_format(
            range.start,
            format!(
                "candidate of {} bytes runs past the end of a {} byte buffer",
                range.len,
                file.data().len()
            ),
        ));
    }

    let reconstructor = ProtoReconstructor::from_bytes(file.payload(&range))?;
    Ok(reconstructor.with_config(config.clone()).render())
}
