//! File-level options recognized by the renderer.
//!
//! Only the options in [`FILE_OPTIONS`] are written, in table order. Anything
//! else in `FileOptions` (custom options, uninterpreted options) is dropped.

use super::escape_string;
use prost_types::FileOptions;
use std::fmt;

/// A present option value, ready to be formatted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionValue<'a> {
    /// Quoted string
    Str(&'a str),
    /// `true` / `false`
    Bool(bool),
    /// Bare enum member name
    Ident(&'static str),
}

impl fmt::Display for OptionValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Str(s) => write!(f, "\"{}\"", escape_string(s)),
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Ident(name) => f.write_str(name),
        }
    }
}

/// One row of the option table
#[derive(Clone, Copy)]
pub struct FileOptionEntry {
    /// Option name as written in `.proto` source
    pub key: &'static str,
    /// Reads the option, `None` when it is not set
    pub value: for<'a> fn(&'a FileOptions) -> Option<OptionValue<'a>>,
}

impl FileOptionEntry {
    /// Formats the option statement if the option is set
    pub fn statement(&self, options: &FileOptions) -> Option<String> {
        (self.value)(options).map(|value| format!("option {} = {};", self.key, value))
    }
}

impl fmt::Debug for FileOptionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileOptionEntry").field("key", &self.key).finish()
    }
}

fn string(value: &Option<String>) -> Option<OptionValue<'_>> {
    value.as_deref().map(OptionValue::Str)
}

fn boolean(value: Option<bool>) -> Option<OptionValue<'static>> {
    value.map(OptionValue::Bool)
}

/// Recognized file options in emission order
pub const FILE_OPTIONS: &[FileOptionEntry] = &[
    FileOptionEntry {
        key: "java_package",
        value: |o| string(&o.java_package),
    },
    FileOptionEntry {
        key: "java_outer_classname",
        value: |o| string(&o.java_outer_classname),
    },
    FileOptionEntry {
        key: "java_multiple_files",
        value: |o| boolean(o.java_multiple_files),
    },
    FileOptionEntry {
        key: "java_string_check_utf8",
        value: |o| boolean(o.java_string_check_utf8),
    },
    FileOptionEntry {
        key: "optimize_for",
        value: |o| {
            o.optimize_for
                .map(|_| OptionValue::Ident(o.optimize_for().as_str_name()))
        },
    },
    FileOptionEntry {
        key: "go_package",
        value: |o| string(&o.go_package),
    },
    FileOptionEntry {
        key: "cc_enable_arenas",
        value: |o| boolean(o.cc_enable_arenas),
    },
    FileOptionEntry {
        key: "objc_class_prefix",
        value: |o| string(&o.objc_class_prefix),
    },
    FileOptionEntry {
        key: "csharp_namespace",
        value: |o| string(&o.csharp_namespace),
    },
    FileOptionEntry {
        key: "swift_prefix",
        value: |o| string(&o.swift_prefix),
    },
    FileOptionEntry {
        key: "php_class_prefix",
        value: |o| string(&o.php_class_prefix),
    },
    FileOptionEntry {
        key: "php_namespace",
        value: |o| string(&o.php_namespace),
    },
    FileOptionEntry {
        key: "php_metadata_namespace",
        value: |o| string(&o.php_metadata_namespace),
    },
    FileOptionEntry {
        key: "ruby_package",
        value: |o| string(&o.ruby_package),
    },
];
