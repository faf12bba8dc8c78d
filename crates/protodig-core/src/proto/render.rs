//! `.proto` source emission.
//!
//! [`SourceWriter`] walks a `FileDescriptorProto` in a fixed order and writes
//! canonical source text. Every element is visited together with its
//! [`AddressPath`] so comments from the [`LocationIndex`] can be reattached.

use super::location::{path, AddressPath, LocationIndex};
use super::options::FILE_OPTIONS;
use super::{escape_string, to_lower_camel_case, ProtoSyntax, ReconstructorConfig};
use crate::scanner::MAX_VALID_NUMBER;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    MethodDescriptorProto, OneofDescriptorProto, ServiceDescriptorProto,
};
use std::fmt::{self, Write};

/// Writes one file's source text into `W`
pub(crate) struct SourceWriter<'a, W: Write> {
    writer: &'a mut W,
    config: &'a ReconstructorConfig,
    locations: &'a LocationIndex,
    syntax: ProtoSyntax,
    indent_level: usize,
}

impl<'a, W: Write> SourceWriter<'a, W> {
    pub(crate) fn new(
        writer: &'a mut W,
        config: &'a ReconstructorConfig,
        locations: &'a LocationIndex,
        syntax: ProtoSyntax,
    ) -> Self {
        Self {
            writer,
            config,
            locations,
            syntax,
            indent_level: 0,
        }
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn write_indent(&mut self) -> fmt::Result {
        for _ in 0..self.indent_level {
            self.writer.write_str(&self.config.indent_str)?;
        }
        Ok(())
    }

    fn write_comment_block(&mut self, comment: &str) -> fmt::Result {
        if comment.is_empty() {
            return Ok(());
        }
        let comment = comment.strip_suffix('\n').unwrap_or(comment);
        for line in comment.split('\n') {
            self.write_indent()?;
            writeln!(self.writer, "//{}", line)?;
        }
        Ok(())
    }

    fn write_leading_comments(&mut self, path: &AddressPath) -> fmt::Result {
        if !self.config.include_comments {
            return Ok(());
        }
        let Some(record) = self.locations.get(path) else {
            return Ok(());
        };

        for detached in &record.leading_detached {
            self.write_comment_block(detached)?;
            writeln!(self.writer)?;
        }
        self.write_comment_block(&record.leading)
    }

    fn write_trailing_comment(&mut self, path: &AddressPath) -> fmt::Result {
        if !self.config.include_comments {
            return Ok(());
        }
        match self.locations.get(path).and_then(|r| r.inline_trailing()) {
            Some(comment) => write!(self.writer, " //{}", comment),
            None => Ok(()),
        }
    }

    /// Ends an inline element: trailing comment, then newline
    fn end_line(&mut self, path: &AddressPath) -> fmt::Result {
        self.write_trailing_comment(path)?;
        writeln!(self.writer)
    }

    /// Closes a block opened at the current indentation
    fn close_block(&mut self, path: &AddressPath) -> fmt::Result {
        self.dedent();
        self.write_indent()?;
        self.writer.write_char('}')?;
        self.end_line(path)?;
        writeln!(self.writer)
    }

    pub(crate) fn write_file(&mut self, proto: &FileDescriptorProto) -> fmt::Result {
        let root = AddressPath::root();

        let syntax_path = AddressPath::file_field(path::FILE_SYNTAX);
        self.write_leading_comments(&syntax_path)?;
        write!(self.writer, "syntax = \"{}\";", self.syntax.as_str())?;
        self.end_line(&syntax_path)?;
        writeln!(self.writer)?;

        if !proto.package().is_empty() {
            let package_path = AddressPath::file_field(path::FILE_PACKAGE);
            self.write_leading_comments(&package_path)?;
            write!(self.writer, "package {};", proto.package())?;
            self.end_line(&package_path)?;
            writeln!(self.writer)?;
        }

        self.write_file_options(proto)?;
        self.write_imports(proto)?;

        for (i, service) in proto.service.iter().enumerate() {
            self.write_service(service, &root.child(path::FILE_SERVICE, i))?;
        }

        for (i, message) in proto.message_type.iter().enumerate() {
            self.write_message(message, &root.child(path::FILE_MESSAGE, i))?;
        }

        for (i, enum_type) in proto.enum_type.iter().enumerate() {
            self.write_enum(enum_type, &root.child(path::FILE_ENUM, i))?;
        }

        self.write_extensions(&proto.extension, &root, path::FILE_EXTENSION)
    }

    fn write_file_options(&mut self, proto: &FileDescriptorProto) -> fmt::Result {
        let Some(options) = &proto.options else {
            return Ok(());
        };

        let mut wrote_option = false;
        for entry in FILE_OPTIONS {
            if let Some(statement) = entry.statement(options) {
                writeln!(self.writer, "{}", statement)?;
                wrote_option = true;
            }
        }

        if wrote_option {
            writeln!(self.writer)?;
        }
        Ok(())
    }

    fn write_imports(&mut self, proto: &FileDescriptorProto) -> fmt::Result {
        if proto.dependency.is_empty() {
            return Ok(());
        }

        let root = AddressPath::root();
        for (i, dependency) in proto.dependency.iter().enumerate() {
            let import_path = root.child(path::FILE_DEPENDENCY, i);
            let index = i32::try_from(i).unwrap_or(i32::MAX);
            let modifier = if proto.public_dependency.contains(&index) {
                "public "
            } else if proto.weak_dependency.contains(&index) {
                "weak "
            } else {
                ""
            };

            self.write_leading_comments(&import_path)?;
            write!(self.writer, "import {}\"{}\";", modifier, dependency)?;
            self.end_line(&import_path)?;
        }

        writeln!(self.writer)
    }

    fn write_service(&mut self, service: &ServiceDescriptorProto, path: &AddressPath) -> fmt::Result {
        self.write_leading_comments(path)?;
        self.write_indent()?;
        writeln!(self.writer, "service {} {{", service.name())?;
        self.indent();

        for (i, method) in service.method.iter().enumerate() {
            self.write_method(method, &path.child(path::SERVICE_METHOD, i))?;
        }

        self.close_block(path)
    }

    fn write_method(&mut self, method: &MethodDescriptorProto, path: &AddressPath) -> fmt::Result {
        let client_stream = if method.client_streaming() { "stream " } else { "" };
        let server_stream = if method.server_streaming() { "stream " } else { "" };

        self.write_leading_comments(path)?;
        self.write_indent()?;
        write!(
            self.writer,
            "rpc {} ({}{}) returns ({}{}) {{}}",
            method.name(),
            client_stream,
            qualified_name(method.input_type()),
            server_stream,
            qualified_name(method.output_type())
        )?;
        self.end_line(path)
    }

    fn write_message(&mut self, message: &DescriptorProto, path: &AddressPath) -> fmt::Result {
        self.write_leading_comments(path)?;
        self.write_indent()?;
        writeln!(self.writer, "message {} {{", message.name())?;
        self.indent();

        self.write_reserved(message)?;
        self.write_extension_ranges(message, path)?;

        for (i, nested) in message.nested_type.iter().enumerate() {
            if is_map_entry(nested) {
                continue;
            }
            self.write_message(nested, &path.child(path::MESSAGE_NESTED, i))?;
        }

        for (i, enum_type) in message.enum_type.iter().enumerate() {
            self.write_enum(enum_type, &path.child(path::MESSAGE_ENUM, i))?;
        }

        for (i, field) in message.field.iter().enumerate() {
            if field.oneof_index.is_none() {
                self.write_field(field, Some(message), &path.child(path::MESSAGE_FIELD, i))?;
            }
        }

        for (i, oneof) in message.oneof_decl.iter().enumerate() {
            self.write_oneof(oneof, i, message, path)?;
        }

        self.write_extensions(&message.extension, path, path::MESSAGE_EXTENSION)?;

        self.close_block(path)
    }

    fn write_reserved(&mut self, message: &DescriptorProto) -> fmt::Result {
        for name in &message.reserved_name {
            self.write_indent()?;
            writeln!(self.writer, "reserved \"{}\";", escape_string(name))?;
        }

        for range in &message.reserved_range {
            self.write_indent()?;
            writeln!(
                self.writer,
                "reserved {};",
                FieldRange::half_open(range.start(), range.end())
            )?;
        }

        Ok(())
    }

    fn write_extension_ranges(&mut self, message: &DescriptorProto, path: &AddressPath) -> fmt::Result {
        for (i, range) in message.extension_range.iter().enumerate() {
            let range_path = path.child(path::MESSAGE_EXTENSION_RANGE, i);
            self.write_leading_comments(&range_path)?;
            self.write_indent()?;
            write!(
                self.writer,
                "extensions {};",
                FieldRange::half_open(range.start(), range.end())
            )?;
            self.end_line(&range_path)?;
        }
        Ok(())
    }

    fn write_oneof(
        &mut self,
        oneof: &OneofDescriptorProto,
        index: usize,
        message: &DescriptorProto,
        message_path: &AddressPath,
    ) -> fmt::Result {
        let members: Vec<(usize, &FieldDescriptorProto)> = message
            .field
            .iter()
            .enumerate()
            .filter(|(_, f)| f.oneof_index.and_then(|i| usize::try_from(i).ok()) == Some(index))
            .collect();

        // proto3 `optional` is modelled as a one-field oneof; write the field alone
        if let [(field_index, field)] = members.as_slice() {
            if field.proto3_optional() {
                let field_path = message_path.child(path::MESSAGE_FIELD, *field_index);
                return self.write_field(field, Some(message), &field_path);
            }
        }

        let oneof_path = message_path.child(path::MESSAGE_ONEOF, index);
        self.write_leading_comments(&oneof_path)?;
        self.write_indent()?;
        writeln!(self.writer, "oneof {} {{", oneof.name())?;
        self.indent();

        for (field_index, field) in members {
            let field_path = message_path.child(path::MESSAGE_FIELD, field_index);
            self.write_field(field, Some(message), &field_path)?;
        }

        self.dedent();
        self.write_indent()?;
        self.writer.write_char('}')?;
        self.end_line(&oneof_path)
    }

    /// Writes a field or extension; `message` is the declaring message, used to resolve map entries
    fn write_field(
        &mut self,
        field: &FieldDescriptorProto,
        message: Option<&DescriptorProto>,
        path: &AddressPath,
    ) -> fmt::Result {
        let map_entry = message.and_then(|m| map_entry_for(field, m));

        self.write_leading_comments(path)?;
        self.write_indent()?;

        if let Some(label) = self.field_label(field, map_entry.is_some()) {
            write!(self.writer, "{} ", label)?;
        }

        match map_entry {
            Some((key, value)) => write!(
                self.writer,
                "map<{}, {}>",
                field_type_name(key),
                field_type_name(value)
            )?,
            None => self.writer.write_str(&field_type_name(field))?,
        }

        write!(self.writer, " {} = {}", field.name(), field.number())?;
        self.write_field_options(field)?;
        self.writer.write_char(';')?;
        self.end_line(path)
    }

    fn field_label(&self, field: &FieldDescriptorProto, is_map: bool) -> Option<&'static str> {
        if field.proto3_optional() {
            return Some("optional");
        }

        match field.label() {
            Label::Repeated => (!is_map).then_some("repeated"),
            Label::Required => (self.syntax == ProtoSyntax::Proto2).then_some("required"),
            Label::Optional => {
                (self.syntax == ProtoSyntax::Proto2 && field.oneof_index.is_none())
                    .then_some("optional")
            }
        }
    }

    fn write_field_options(&mut self, field: &FieldDescriptorProto) -> fmt::Result {
        let mut options = Vec::new();

        if let Some(default) = &field.default_value {
            options.push(format!("default = {}", format_default(field, default)));
        }

        if field.extendee.is_none() {
            if let Some(json_name) = &field.json_name {
                if *json_name != to_lower_camel_case(field.name()) {
                    options.push(format!("json_name = \"{}\"", escape_string(json_name)));
                }
            }
        }

        if let Some(opts) = &field.options {
            if let Some(packed) = opts.packed {
                options.push(format!("packed = {}", packed));
            }
            if opts.deprecated == Some(true) {
                options.push("deprecated = true".to_string());
            }
        }

        if !options.is_empty() {
            write!(self.writer, " [{}]", options.join(", "))?;
        }
        Ok(())
    }

    fn write_enum(&mut self, enum_type: &EnumDescriptorProto, path: &AddressPath) -> fmt::Result {
        self.write_leading_comments(path)?;
        self.write_indent()?;
        writeln!(self.writer, "enum {} {{", enum_type.name())?;
        self.indent();

        if enum_type.options.as_ref().and_then(|o| o.allow_alias) == Some(true) {
            self.write_indent()?;
            writeln!(self.writer, "option allow_alias = true;")?;
        }

        for range in &enum_type.reserved_range {
            self.write_indent()?;
            writeln!(
                self.writer,
                "reserved {};",
                EnumRange::inclusive(range.start(), range.end())
            )?;
        }

        for name in &enum_type.reserved_name {
            self.write_indent()?;
            writeln!(self.writer, "reserved \"{}\";", escape_string(name))?;
        }

        for (i, value) in enum_type.value.iter().enumerate() {
            let value_path = path.child(path::ENUM_VALUE, i);
            self.write_leading_comments(&value_path)?;
            self.write_indent()?;
            write!(self.writer, "{} = {}", value.name(), value.number())?;
            if value.options.as_ref().and_then(|o| o.deprecated) == Some(true) {
                write!(self.writer, " [deprecated = true]")?;
            }
            self.writer.write_char(';')?;
            self.end_line(&value_path)?;
        }

        self.close_block(path)
    }

    /// Writes extensions, grouping consecutive ones that extend the same message
    fn write_extensions(
        &mut self,
        extensions: &[FieldDescriptorProto],
        parent: &AddressPath,
        field_number: i32,
    ) -> fmt::Result {
        let mut i = 0;
        while i < extensions.len() {
            let extendee = extensions[i].extendee();
            let group_len = extensions[i..]
                .iter()
                .take_while(|e| e.extendee() == extendee)
                .count();

            self.write_indent()?;
            writeln!(self.writer, "extend {} {{", qualified_name(extendee))?;
            self.indent();
            for (offset, extension) in extensions[i..i + group_len].iter().enumerate() {
                self.write_field(extension, None, &parent.child(field_number, i + offset))?;
            }
            self.dedent();
            self.write_indent()?;
            writeln!(self.writer, "}}")?;
            writeln!(self.writer)?;

            i += group_len;
        }
        Ok(())
    }
}

/// A message reserved or extension range, stored half-open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldRange {
    first: i64,
    last: i64,
}

impl FieldRange {
    /// Normalizes `[start, end)` to an inclusive pair, ordering reversed bounds
    pub(crate) fn half_open(start: i32, end: i32) -> Self {
        let (low, high) = if start <= end { (start, end) } else { (end, start) };
        Self {
            first: i64::from(low),
            last: i64::from(high) - 1,
        }
    }
}

impl fmt::Display for FieldRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first)
        } else if self.last == i64::from(MAX_VALID_NUMBER) {
            write!(f, "{} to max", self.first)
        } else {
            write!(f, "{} to {}", self.first, self.last)
        }
    }
}

/// An enum reserved range, stored inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EnumRange {
    first: i32,
    last: i32,
}

impl EnumRange {
    pub(crate) fn inclusive(start: i32, end: i32) -> Self {
        let (first, last) = if start <= end { (start, end) } else { (end, start) };
        Self { first, last }
    }
}

impl fmt::Display for EnumRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first)
        } else if self.last == i32::MAX {
            write!(f, "{} to max", self.first)
        } else {
            write!(f, "{} to {}", self.first, self.last)
        }
    }
}

/// Type references are written fully qualified, with a leading dot
fn qualified_name(name: &str) -> String {
    if name.starts_with('.') {
        name.to_string()
    } else {
        format!(".{}", name)
    }
}

fn is_named_type(field: &FieldDescriptorProto) -> bool {
    if field.type_name().is_empty() {
        return false;
    }
    match field.r#type {
        None => true,
        Some(_) => matches!(field.r#type(), Type::Message | Type::Enum | Type::Group),
    }
}

fn field_type_name(field: &FieldDescriptorProto) -> String {
    if is_named_type(field) {
        return qualified_name(field.type_name());
    }

    match field.r#type() {
        Type::Double => "double",
        Type::Float => "float",
        Type::Int64 => "int64",
        Type::Uint64 => "uint64",
        Type::Int32 => "int32",
        Type::Fixed64 => "fixed64",
        Type::Fixed32 => "fixed32",
        Type::Bool => "bool",
        Type::String => "string",
        Type::Bytes => "bytes",
        Type::Uint32 => "uint32",
        Type::Sfixed32 => "sfixed32",
        Type::Sfixed64 => "sfixed64",
        Type::Sint32 => "sint32",
        Type::Sint64 => "sint64",
        // Named types without a type name have nothing better to show
        Type::Message | Type::Enum | Type::Group => "bytes",
    }
    .to_string()
}

fn format_default(field: &FieldDescriptorProto, default: &str) -> String {
    match field.r#type() {
        Type::String => format!("\"{}\"", escape_string(default)),
        // protoc stores bytes defaults already C-escaped
        Type::Bytes => format!("\"{}\"", default),
        Type::Int32 | Type::Int64 | Type::Sint32 | Type::Sint64 | Type::Sfixed32 | Type::Sfixed64 => {
            default
                .trim()
                .parse::<i64>()
                .map_or_else(|_| default.to_string(), |v| v.to_string())
        }
        Type::Uint32 | Type::Uint64 | Type::Fixed32 | Type::Fixed64 => default
            .trim()
            .parse::<u64>()
            .map_or_else(|_| default.to_string(), |v| v.to_string()),
        Type::Float | Type::Double => match default.trim().to_ascii_lowercase().as_str() {
            "inf" | "+inf" | "infinity" => "inf".to_string(),
            "-inf" | "-infinity" => "-inf".to_string(),
            "nan" | "-nan" => "nan".to_string(),
            _ => default.to_string(),
        },
        Type::Bool | Type::Enum | Type::Message | Type::Group => default.to_string(),
    }
}

fn is_map_entry(message: &DescriptorProto) -> bool {
    message
        .options
        .as_ref()
        .and_then(|o| o.map_entry)
        .unwrap_or(false)
}

/// Key and value fields of the map entry a field refers to, if it is a map
fn map_entry_for<'m>(
    field: &FieldDescriptorProto,
    message: &'m DescriptorProto,
) -> Option<(&'m FieldDescriptorProto, &'m FieldDescriptorProto)> {
    if field.label() != Label::Repeated || field.r#type() != Type::Message {
        return None;
    }

    let type_name = field.type_name();
    let entry = message.nested_type.iter().find(|nested| {
        is_map_entry(nested)
            && (type_name == nested.name()
                || type_name
                    .strip_suffix(nested.name())
                    .is_some_and(|prefix| prefix.ends_with('.')))
    })?;

    let key = entry.field.iter().find(|f| f.number() == 1)?;
    let value = entry.field.iter().find(|f| f.number() == 2)?;
    Some((key, value))
}
