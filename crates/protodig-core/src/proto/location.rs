//! Comment lookup by descriptor location.
//!
//! protoc keeps comments out of the descriptor tree proper. They live in
//! `SourceCodeInfo`, keyed by a path of field numbers and indices that walks
//! from the `FileDescriptorProto` root down to the commented element. For
//! example `[4, 0, 2, 1]` is `message_type[0].field[1]`.

use prost_types::{source_code_info::Location, FileDescriptorProto};
use std::collections::HashMap;
use std::fmt;

/// Field numbers used to build location paths.
pub mod path {
    /// `FileDescriptorProto.package`
    pub const FILE_PACKAGE: i32 = 2;
    /// `FileDescriptorProto.dependency`
    pub const FILE_DEPENDENCY: i32 = 3;
    /// `FileDescriptorProto.message_type`
    pub const FILE_MESSAGE: i32 = 4;
    /// `FileDescriptorProto.enum_type`
    pub const FILE_ENUM: i32 = 5;
    /// `FileDescriptorProto.service`
    pub const FILE_SERVICE: i32 = 6;
    /// `FileDescriptorProto.extension`
    pub const FILE_EXTENSION: i32 = 7;
    /// `FileDescriptorProto.syntax`
    pub const FILE_SYNTAX: i32 = 12;

    /// `DescriptorProto.field`
    pub const MESSAGE_FIELD: i32 = 2;
    /// `DescriptorProto.nested_type`
    pub const MESSAGE_NESTED: i32 = 3;
    /// `DescriptorProto.enum_type`
    pub const MESSAGE_ENUM: i32 = 4;
    /// `DescriptorProto.extension_range`
    pub const MESSAGE_EXTENSION_RANGE: i32 = 5;
    /// `DescriptorProto.extension`
    pub const MESSAGE_EXTENSION: i32 = 6;
    /// `DescriptorProto.oneof_decl`
    pub const MESSAGE_ONEOF: i32 = 8;

    /// `EnumDescriptorProto.value`
    pub const ENUM_VALUE: i32 = 2;

    /// `ServiceDescriptorProto.method`
    pub const SERVICE_METHOD: i32 = 2;
}

/// Location of one element in a descriptor tree.
///
/// Paths are immutable values: [`AddressPath::child`] returns a new path and
/// leaves the receiver untouched, so sibling subtrees never share state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AddressPath(Vec<i32>);

impl AddressPath {
    /// The file root
    pub fn root() -> Self {
        Self::default()
    }

    /// Path of a singular file-level field such as `syntax` or `package`
    pub fn file_field(field: i32) -> Self {
        Self(vec![field])
    }

    /// Path of element `index` in the repeated field `field` below this path
    pub fn child(&self, field: i32, index: usize) -> Self {
        let mut parts = Vec::with_capacity(self.0.len() + 2);
        parts.extend_from_slice(&self.0);
        parts.push(field);
        parts.push(i32::try_from(index).unwrap_or(i32::MAX));
        Self(parts)
    }

    /// The enclosing element, or `None` at the root
    pub fn parent(&self) -> Option<Self> {
        (self.0.len() >= 2).then(|| Self(self.0[..self.0.len() - 2].to_vec()))
    }

    /// The raw path components
    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }
}

impl From<Vec<i32>> for AddressPath {
    fn from(parts: Vec<i32>) -> Self {
        Self(parts)
    }
}

impl fmt::Display for AddressPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

/// Comments recorded for one element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentRecord {
    /// Comment directly above the element
    pub leading: String,
    /// Comment blocks above the element separated from it by blank lines
    pub leading_detached: Vec<String>,
    /// Comment after the element
    pub trailing: String,
}

impl CommentRecord {
    fn from_location(location: &Location) -> Self {
        Self {
            leading: location.leading_comments().to_string(),
            leading_detached: location.leading_detached_comments.clone(),
            trailing: location.trailing_comments().to_string(),
        }
    }

    /// True when no comment text is attached
    pub fn is_empty(&self) -> bool {
        self.leading.is_empty() && self.trailing.is_empty() && self.leading_detached.is_empty()
    }

    /// The trailing comment if it fits on one line.
    ///
    /// Trailing newlines are stripped; a comment with an internal line break
    /// has no inline form and yields `None`.
    pub fn inline_trailing(&self) -> Option<&str> {
        let comment = self.trailing.trim_end_matches(['\n', '\r']);
        if comment.trim().is_empty() || comment.contains('\n') {
            None
        } else {
            Some(comment)
        }
    }
}

/// Lookup from element location to its comments
#[derive(Debug, Clone, Default)]
pub struct LocationIndex {
    comments: HashMap<AddressPath, CommentRecord>,
}

impl LocationIndex {
    /// An index with no comments
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds the index from a descriptor's `SourceCodeInfo`.
    ///
    /// protoc may record several spans for one path; the first span that
    /// carries comment text wins.
    pub fn from_proto(proto: &FileDescriptorProto) -> Self {
        let Some(info) = &proto.source_code_info else {
            return Self::empty();
        };

        let mut comments: HashMap<AddressPath, CommentRecord> = HashMap::new();
        for location in &info.location {
            let record = CommentRecord::from_location(location);
            if record.is_empty() {
                continue;
            }
            comments
                .entry(AddressPath::from(location.path.clone()))
                .or_insert(record);
        }

        Self { comments }
    }

    /// Comments attached to `path`, if any
    pub fn get(&self, path: &AddressPath) -> Option<&CommentRecord> {
        self.comments.get(path)
    }

    /// Number of commented locations
    pub fn len(&self) -> usize {
        self.comments.len()
    }

    /// True when no location carries comments
    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }
}
