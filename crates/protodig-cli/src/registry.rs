//! Output bookkeeping: which rendered files were already written, and under
//! which name a differing file with the same name should go.

use clap::ValueEnum;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Strategy for resolving naming conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum ConflictStrategy {
    /// Append a short content hash: file~a1b2c3d4.proto
    HashSuffix,
    /// Append source binary name: file~from-binary.proto
    SourceSuffix,
    /// Skip conflicting files (keep first occurrence only)
    SkipConflicts,
}

/// What to do with one rendered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Placement {
    /// Write under the given relative path
    Write(PathBuf),
    /// Identical content was already placed under this name
    Duplicate,
    /// Different content already owns the name and the strategy skips it
    Conflict,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Stats {
    pub(crate) found: usize,
    pub(crate) duplicates: usize,
    pub(crate) renamed: usize,
    pub(crate) skipped: usize,
    pub(crate) rejected: usize,
    pub(crate) written: usize,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} found, {} duplicates, {} renamed, {} skipped, {} rejected, {} written",
            self.found, self.duplicates, self.renamed, self.skipped, self.rejected, self.written
        )
    }
}

/// Content hashes seen per output name, across every scanned binary
#[derive(Debug)]
pub(crate) struct OutputRegistry {
    strategy: ConflictStrategy,
    variants: HashMap<String, Vec<String>>,
    pub(crate) stats: Stats,
}

impl OutputRegistry {
    pub(crate) fn new(strategy: ConflictStrategy) -> Self {
        Self {
            strategy,
            variants: HashMap::new(),
            stats: Stats::default(),
        }
    }

    /// First 8 hex digits of the blake3 digest
    pub(crate) fn content_hash(content: &str) -> String {
        blake3::hash(content.as_bytes()).to_hex()[..8].to_string()
    }

    /// Decides where `content` named `filename` goes, recording the decision
    pub(crate) fn place(&mut self, filename: &str, content: &str, source: &Path) -> Placement {
        self.stats.found += 1;
        let hash = Self::content_hash(content);

        let known = self.variants.get(filename).map(Vec::as_slice).unwrap_or_default();
        if known.contains(&hash) {
            debug!("{} already extracted (hash {})", filename, hash);
            self.stats.duplicates += 1;
            return Placement::Duplicate;
        }

        let target = if known.is_empty() {
            filename.to_string()
        } else {
            let suffix = match self.strategy {
                ConflictStrategy::SkipConflicts => {
                    debug!("{} already extracted with other content, skipping", filename);
                    self.stats.skipped += 1;
                    return Placement::Conflict;
                }
                ConflictStrategy::HashSuffix => format!("~{}", hash),
                ConflictStrategy::SourceSuffix => {
                    let binary = source
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or("unknown");
                    format!("~from-{}", binary)
                }
            };
            let renamed = with_suffix(filename, &suffix);
            info!("{} differs from an earlier extraction, using {}", filename, renamed);
            self.stats.renamed += 1;
            renamed
        };

        self.variants
            .entry(filename.to_string())
            .or_default()
            .push(hash);
        Placement::Write(PathBuf::from(target))
    }
}

/// Inserts `suffix` before a trailing `.proto`, or appends it
fn with_suffix(filename: &str, suffix: &str) -> String {
    match filename.strip_suffix(".proto") {
        Some(stem) => format!("{}{}.proto", stem, suffix),
        None => format!("{}{}", filename, suffix),
    }
}
