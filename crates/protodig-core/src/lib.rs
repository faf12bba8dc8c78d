//! # protodig-core
//!
//! A library for recovering Protocol Buffer definitions from compiled binaries.
//!
//! Programs built with protobuf code generators usually embed each `.proto`
//! file as a serialized `FileDescriptorProto`. This crate provides:
//! - Scanning arbitrary bytes for those embedded descriptors
//! - Decoding and validating each descriptor on its own
//! - Rendering canonical `.proto` source, comments included when present
//!
//! ## Architecture
//!
//! - [`scanner`]: Binary scanning and wire format parsing
//! - [`proto`]: Descriptor validation and `.proto` reconstruction
//! - [`extract`]: Per-candidate pipeline with isolated failures
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use protodig_core::{extract, scan_file, ReconstructorConfig, ScannerConfig};
//!
//! let file = scan_file("./target/release/my_app", &ScannerConfig::default())?;
//!
//! for extraction in extract(&file, &ReconstructorConfig::default()) {
//!     if let Ok(rendered) = extraction.result {
//!         println!("// {}\n{}", rendered.filename, rendered.text);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! [`ScanStrategy`] can be implemented to replace the candidate search while
//! keeping the rest of the pipeline.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod error;
pub mod extract;
pub mod proto;
pub mod scanner;

// Re-export primary types for convenience
pub use error::{Error, Result};
pub use extract::{extract, Extraction};
pub use proto::{ProtoReconstructor, ProtoSyntax, ReconstructorConfig, RenderedFile};
pub use scanner::{scan_file, CandidateRange, ScanStrategy, ScannedFile, Scanner, ScannerConfig};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: u32 = scanner::MAX_VALID_NUMBER;
