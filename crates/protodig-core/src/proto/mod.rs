//! `.proto` source reconstruction.
//!
//! This module turns one serialized `FileDescriptorProto` back into
//! human-readable `.proto` text.
//!
//! ## Architecture
//!
//! Reconstruction is handled by [`ProtoReconstructor`], which:
//!
//! 1. Decodes raw bytes into a `FileDescriptorProto`
//! 2. Validates the tree on its own (imports are never resolved)
//! 3. Indexes `SourceCodeInfo` comments by location path
//! 4. Writes source text in a fixed order, reattaching comments
//!
//! Type references are written exactly as stored, so a file whose imports
//! were not embedded in the same binary still renders.

mod location;
mod options;
mod render;
mod validate;

use crate::error::{Error, Result};
use bytes::Buf;
use prost::Message;
use prost_types::FileDescriptorProto;
use std::fmt::Write as FmtWrite;

pub use location::{path, AddressPath, CommentRecord, LocationIndex};
pub use options::{FileOptionEntry, OptionValue, FILE_OPTIONS};

/// Configuration for proto reconstruction
#[derive(Debug, Clone)]
pub struct ReconstructorConfig {
    /// Indentation string (default: 2 spaces)
    pub indent_str: String,
    /// Reattach comments from `SourceCodeInfo` when present
    pub include_comments: bool,
}

impl Default for ReconstructorConfig {
    fn default() -> Self {
        Self {
            indent_str: "  ".to_string(),
            include_comments: true,
        }
    }
}

impl ReconstructorConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets whether to include comments
    pub fn include_comments(mut self, include: bool) -> Self {
        self.include_comments = include;
        self
    }
}

/// Proto syntax version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoSyntax {
    /// Proto2 syntax
    Proto2,
    /// Proto3 syntax
    Proto3,
}

impl ProtoSyntax {
    /// Returns the syntax declaration string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtoSyntax::Proto2 => "proto2",
            ProtoSyntax::Proto3 => "proto3",
        }
    }
}

impl TryFrom<&str> for ProtoSyntax {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "" | "proto2" => Ok(ProtoSyntax::Proto2),
            "proto3" => Ok(ProtoSyntax::Proto3),
            _ => Err(Error::UnsupportedSyntax {
                syntax: value.to_string(),
            }),
        }
    }
}

/// A reconstructed source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    /// Name declared inside the descriptor
    pub source_name: String,
    /// Relative output path, see [`ProtoReconstructor::output_filename`]
    pub filename: String,
    /// `.proto` source text
    pub text: String,
}

/// Reconstructs proto definitions from FileDescriptorProto
#[derive(Debug)]
pub struct ProtoReconstructor {
    proto: FileDescriptorProto,
    syntax: ProtoSyntax,
    locations: LocationIndex,
    config: ReconstructorConfig,
}

impl ProtoReconstructor {
    /// Decodes and validates a serialized descriptor
    pub fn from_bytes(data: impl Buf) -> Result<Self> {
        let proto = FileDescriptorProto::decode(data)?;
        Self::from_proto(proto)
    }

    /// Validates an already decoded descriptor
    pub fn from_proto(proto: FileDescriptorProto) -> Result<Self> {
        let syntax = validate::validate_file(&proto)?;
        let locations = LocationIndex::from_proto(&proto);

        Ok(Self {
            proto,
            syntax,
            locations,
            config: ReconstructorConfig::default(),
        })
    }

    /// Replaces the rendering configuration
    pub fn with_config(mut self, config: ReconstructorConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the filename declared in the descriptor
    pub fn filename(&self) -> &str {
        self.proto.name()
    }

    /// Returns the path the file should be written to.
    ///
    /// When `go_package` has the `import/path;package` form, the import path
    /// is joined with the last component of the declared name. Otherwise the
    /// declared name is used as is.
    pub fn output_filename(&self) -> String {
        let go_package = self
            .proto
            .options
            .as_ref()
            .and_then(|o| o.go_package.as_deref());
        output_filename(self.proto.name(), go_package)
    }

    /// Returns the proto syntax version
    pub fn syntax(&self) -> ProtoSyntax {
        self.syntax
    }

    /// Returns the raw FileDescriptorProto
    pub fn proto(&self) -> &FileDescriptorProto {
        &self.proto
    }

    /// Returns the comment index built from `SourceCodeInfo`
    pub fn locations(&self) -> &LocationIndex {
        &self.locations
    }

    /// Reconstruct the proto definition as a string
    pub fn reconstruct(&self) -> String {
        let mut output = String::new();
        self.write_to(&mut output).expect("String write cannot fail");
        output
    }

    /// Write the reconstructed proto to a writer
    pub fn write_to(&self, w: &mut impl FmtWrite) -> std::fmt::Result {
        let mut writer = render::SourceWriter::new(w, &self.config, &self.locations, self.syntax);
        writer.write_file(&self.proto)
    }

    /// Renders the file together with its naming metadata
    pub fn render(&self) -> RenderedFile {
        RenderedFile {
            source_name: self.filename().to_string(),
            filename: self.output_filename(),
            text: self.reconstruct(),
        }
    }
}

fn output_filename(declared: &str, go_package: Option<&str>) -> String {
    let Some((import_path, _)) = go_package.and_then(|p| p.split_once(';')) else {
        return declared.to_string();
    };

    let base = declared.rsplit('/').next().unwrap_or(declared);
    let import_path = import_path.trim_end_matches('/');
    if import_path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", import_path, base)
    }
}

/// Escape a string for proto syntax
pub(crate) fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            _ if c.is_ascii_control() => {
                result.push_str(&format!("\\x{:02x}", c as u8));
            }
            _ => result.push(c),
        }
    }
    result
}

/// Default JSON name protoc derives from a field name
pub(crate) fn to_lower_camel_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize_next = false;

    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }

    result
}
