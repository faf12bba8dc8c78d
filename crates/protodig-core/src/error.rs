//! Error types for the protodig-core library.
//!
//! Errors fall into three groups: wire-level failures raised while walking
//! raw bytes, per-candidate failures raised while turning a candidate into
//! source text, and I/O failures raised when reading input.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Shorthand used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong between reading a binary and rendering source
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The input binary could not be read
    #[error("cannot read {}: {source}", path.display())]
    FileRead {
        /// Input that was being read
        path: PathBuf,
        /// Cause reported by the OS
        #[source]
        source: io::Error,
    },

    /// Bytes that do not follow the protobuf encoding rules
    #[error("malformed wire data at byte {offset}: {details}")]
    InvalidWireFormat {
        /// Position of the offending byte
        offset: usize,
        /// What was wrong with it
        details: String,
    },

    /// A varint ran past the buffer or past ten bytes
    #[error("truncated or overlong varint at byte {offset}")]
    VarintDecode {
        /// Position of the varint's first byte
        offset: usize,
    },

    /// A record tag carried a field number outside the valid range.
    ///
    /// While scanning this marks the natural end of an embedded message.
    #[error("field number {number} is outside 1..={max}")]
    InvalidFieldNumber {
        /// Number decoded from the tag
        number: u64,
        /// Largest number a tag may carry
        max: u32,
    },

    /// Self-describing consumption of a candidate hit malformed data mid-message
    #[error("could not find the end of the descriptor starting at offset {offset}: {source}")]
    ScanBoundary {
        /// Offset of the candidate's first byte
        offset: usize,
        /// The wire error that stopped consumption
        #[source]
        source: Box<Error>,
    },

    /// The candidate bytes are not a `FileDescriptorProto`
    #[error("candidate is not a file descriptor: {0}")]
    DescriptorParse(#[from] prost::DecodeError),

    /// A decoded descriptor could not be finalized
    #[error("inconsistent file descriptor: {0}")]
    DescriptorBuild(String),

    /// The `syntax` field names something other than proto2 or proto3
    #[error("syntax \"{syntax}\" is not supported")]
    UnsupportedSyntax {
        /// Value found in the descriptor
        syntax: String,
    },
}

impl Error {
    pub(crate) fn file_read(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        Self::FileRead { path, source }
    }

    pub(crate) fn invalid_wire_format(offset: usize, details: impl Into<String>) -> Self {
        let details = details.into();
        Self::InvalidWireFormat { offset, details }
    }

    pub(crate) fn varint_decode(offset: usize) -> Self {
        Self::VarintDecode { offset }
    }

    pub(crate) fn scan_boundary(offset: usize, source: Error) -> Self {
        Self::ScanBoundary {
            offset,
            source: Box::new(source),
        }
    }

    pub(crate) fn descriptor_build(reason: impl Into<String>) -> Self {
        Self::DescriptorBuild(reason.into())
    }

    /// Shifts the offset of a wire-level error by `base`.
    ///
    /// Wire routines report offsets relative to the slice they were handed.
    pub(crate) fn offset_by(self, base: usize) -> Self {
        match self {
            Self::InvalidWireFormat { offset, details } => Self::InvalidWireFormat {
                offset: offset + base,
                details,
            },
            Self::VarintDecode { offset } => Self::VarintDecode {
                offset: offset + base,
            },
            other => other,
        }
    }

    /// Returns true if this error marks the natural end of an embedded message
    pub fn is_end_of_message(&self) -> bool {
        matches!(self, Self::InvalidFieldNumber { .. })
    }

    /// Whether only the current candidate is lost, not the whole input
    pub fn is_candidate_local(&self) -> bool {
        matches!(
            self,
            Self::DescriptorParse(_)
                | Self::DescriptorBuild(_)
                | Self::UnsupportedSyntax { .. }
                | Self::ScanBoundary { .. }
                | Self::InvalidWireFormat { .. }
        )
    }
}
