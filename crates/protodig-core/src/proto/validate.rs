//! Structural checks run before a decoded descriptor is rendered.
//!
//! A candidate can decode cleanly and still be garbage: random bytes that
//! happen to parse, or a descriptor cut short at the wrong boundary. These
//! checks reject trees that protoc could never have produced. They work on
//! one file at a time and never try to resolve type references.

use super::ProtoSyntax;
use crate::error::{Error, Result};
use crate::scanner::MAX_VALID_NUMBER;
use prost_types::{DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto};
use std::collections::{HashMap, HashSet};

/// Checks that `proto` describes a well-formed file
pub(crate) fn validate_file(proto: &FileDescriptorProto) -> Result<ProtoSyntax> {
    if proto.name().is_empty() {
        return Err(Error::descriptor_build("file has no name"));
    }

    let syntax = ProtoSyntax::try_from(proto.syntax())?;

    for &index in proto.public_dependency.iter().chain(&proto.weak_dependency) {
        if usize::try_from(index).map_or(true, |i| i >= proto.dependency.len()) {
            return Err(Error::descriptor_build(format!(
                "{}: dependency index {} out of range",
                proto.name(),
                index
            )));
        }
    }

    let scope = proto.package();
    let mut symbols = Scope::new(scope);
    for message in &proto.message_type {
        symbols.declare(message.name())?;
        validate_message(message, &qualify(scope, message.name()))?;
    }
    for enum_type in &proto.enum_type {
        symbols.declare(enum_type.name())?;
        declare_values(&mut symbols, enum_type)?;
        validate_enum(enum_type, &qualify(scope, enum_type.name()))?;
    }
    for extension in &proto.extension {
        symbols.declare(extension.name())?;
        validate_number(extension, scope)?;
    }
    for service in &proto.service {
        symbols.declare(service.name())?;
        let full_name = qualify(scope, service.name());
        let mut methods = Scope::new(&full_name);
        for method in &service.method {
            methods.declare(method.name())?;
        }
    }

    Ok(syntax)
}

fn validate_message(message: &DescriptorProto, full_name: &str) -> Result<()> {
    let mut symbols = Scope::new(full_name);
    let mut numbers: HashMap<i32, &str> = HashMap::new();

    for field in &message.field {
        symbols.declare(field.name())?;
        validate_number(field, full_name)?;

        if let Some(previous) = numbers.insert(field.number(), field.name()) {
            return Err(Error::descriptor_build(format!(
                "{}: fields \"{}\" and \"{}\" both use number {}",
                full_name,
                previous,
                field.name(),
                field.number()
            )));
        }

        if let Some(index) = field.oneof_index {
            if usize::try_from(index).map_or(true, |i| i >= message.oneof_decl.len()) {
                return Err(Error::descriptor_build(format!(
                    "{}.{}: oneof index {} out of range",
                    full_name,
                    field.name(),
                    index
                )));
            }
        }
    }

    for oneof in &message.oneof_decl {
        symbols.declare(oneof.name())?;
    }
    for extension in &message.extension {
        symbols.declare(extension.name())?;
        validate_number(extension, full_name)?;
    }
    for nested in &message.nested_type {
        symbols.declare(nested.name())?;
        validate_message(nested, &qualify(full_name, nested.name()))?;
    }
    for enum_type in &message.enum_type {
        symbols.declare(enum_type.name())?;
        declare_values(&mut symbols, enum_type)?;
        validate_enum(enum_type, &qualify(full_name, enum_type.name()))?;
    }

    Ok(())
}

fn validate_enum(enum_type: &EnumDescriptorProto, full_name: &str) -> Result<()> {
    let allow_alias = enum_type
        .options
        .as_ref()
        .and_then(|o| o.allow_alias)
        .unwrap_or(false);
    if allow_alias {
        return Ok(());
    }

    let mut numbers: HashMap<i32, &str> = HashMap::new();
    for value in &enum_type.value {
        if let Some(previous) = numbers.insert(value.number(), value.name()) {
            return Err(Error::descriptor_build(format!(
                "{}: values {} and {} both use number {} without allow_alias",
                full_name,
                previous,
                value.name(),
                value.number()
            )));
        }
    }

    Ok(())
}

fn validate_number(field: &FieldDescriptorProto, scope: &str) -> Result<()> {
    let number = field.number();
    if number < 1 || number as u32 > MAX_VALID_NUMBER {
        return Err(Error::descriptor_build(format!(
            "{}.{}: field number {} out of range",
            scope,
            field.name(),
            number
        )));
    }
    Ok(())
}

/// Enum values live in the scope that encloses their enum.
fn declare_values(scope: &mut Scope<'_>, enum_type: &EnumDescriptorProto) -> Result<()> {
    for value in &enum_type.value {
        scope.declare(value.name())?;
    }
    Ok(())
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

/// Names declared directly in one scope
struct Scope<'a> {
    name: &'a str,
    declared: HashSet<String>,
}

impl<'a> Scope<'a> {
    fn new(name: &'a str) -> Self {
        Self {
            name,
            declared: HashSet::new(),
        }
    }

    fn declare(&mut self, symbol: &str) -> Result<()> {
        if symbol.is_empty() {
            return Err(Error::descriptor_build(format!(
                "unnamed element in \"{}\"",
                self.name
            )));
        }
        if !self.declared.insert(symbol.to_string()) {
            return Err(Error::descriptor_build(format!(
                "\"{}\" is already defined in \"{}\"",
                symbol, self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::{
        EnumOptions, EnumValueDescriptorProto, MethodDescriptorProto, OneofDescriptorProto,
        ServiceDescriptorProto,
    };

    fn field(name: &str, number: i32) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            ..Default::default()
        }
    }

    fn message(name: &str, field: Vec<FieldDescriptorProto>) -> DescriptorProto {
        DescriptorProto {
            name: Some(name.to_string()),
            field,
            ..Default::default()
        }
    }

    fn value(name: &str, number: i32) -> EnumValueDescriptorProto {
        EnumValueDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            ..Default::default()
        }
    }

    fn file(message_type: Vec<DescriptorProto>) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some("test.proto".to_string()),
            package: Some("test".to_string()),
            message_type,
            syntax: Some("proto3".to_string()),
            ..Default::default()
        }
    }

    fn build_error(proto: &FileDescriptorProto) -> String {
        match validate_file(proto) {
            Err(Error::DescriptorBuild(msg)) => msg,
            other => panic!("expected build error, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_file() {
        let proto = file(vec![message("A", vec![field("x", 1), field("y", 2)])]);
        assert_eq!(validate_file(&proto).unwrap(), ProtoSyntax::Proto3);
    }

    #[test]
    fn test_missing_name() {
        let proto = FileDescriptorProto::default();
        assert!(build_error(&proto).contains("no name"));
    }

    #[test]
    fn test_unsupported_syntax() {
        let mut proto = file(vec![]);
        proto.syntax = Some("proto4".to_string());
        assert!(matches!(
            validate_file(&proto),
            Err(Error::UnsupportedSyntax { .. })
        ));
    }

    #[test]
    fn test_duplicate_message() {
        let proto = file(vec![message("A", vec![]), message("A", vec![])]);
        assert!(build_error(&proto).contains("\"A\" is already defined in \"test\""));
    }

    #[test]
    fn test_duplicate_field_number() {
        let proto = file(vec![message("A", vec![field("x", 1), field("y", 1)])]);
        assert!(build_error(&proto).contains("both use number 1"));
    }

    #[test]
    fn test_field_number_out_of_range() {
        let proto = file(vec![message("A", vec![field("x", 0)])]);
        assert!(build_error(&proto).contains("out of range"));

        let proto = file(vec![message("A", vec![field("x", 536_870_912)])]);
        assert!(build_error(&proto).contains("out of range"));
    }

    #[test]
    fn test_oneof_index_out_of_range() {
        let mut x = field("x", 1);
        x.oneof_index = Some(0);
        let proto = file(vec![message("A", vec![x.clone()])]);
        assert!(build_error(&proto).contains("oneof index 0"));

        let mut with_oneof = message("A", vec![x]);
        with_oneof.oneof_decl.push(OneofDescriptorProto {
            name: Some("choice".to_string()),
            ..Default::default()
        });
        assert!(validate_file(&file(vec![with_oneof])).is_ok());
    }

    #[test]
    fn test_enum_values_share_enclosing_scope() {
        let mut proto = file(vec![]);
        proto.enum_type = vec![
            EnumDescriptorProto {
                name: Some("Color".to_string()),
                value: vec![value("UNKNOWN", 0)],
                ..Default::default()
            },
            EnumDescriptorProto {
                name: Some("Shape".to_string()),
                value: vec![value("UNKNOWN", 0)],
                ..Default::default()
            },
        ];
        assert!(build_error(&proto).contains("\"UNKNOWN\" is already defined"));
    }

    #[test]
    fn test_enum_alias() {
        let aliased = |allow_alias: Option<bool>| {
            let mut proto = file(vec![]);
            proto.enum_type = vec![EnumDescriptorProto {
                name: Some("Mode".to_string()),
                value: vec![value("MODE_A", 0), value("MODE_B", 0)],
                options: allow_alias.map(|a| EnumOptions {
                    allow_alias: Some(a),
                    ..Default::default()
                }),
                ..Default::default()
            }];
            proto
        };

        assert!(build_error(&aliased(None)).contains("without allow_alias"));
        assert!(validate_file(&aliased(Some(true))).is_ok());
    }

    #[test]
    fn test_duplicate_method() {
        let method = MethodDescriptorProto {
            name: Some("Get".to_string()),
            ..Default::default()
        };
        let mut proto = file(vec![]);
        proto.service = vec![ServiceDescriptorProto {
            name: Some("Store".to_string()),
            method: vec![method.clone(), method],
            ..Default::default()
        }];
        assert!(build_error(&proto).contains("\"Get\" is already defined in \"test.Store\""));
    }

    #[test]
    fn test_public_dependency_index() {
        let mut proto = file(vec![]);
        proto.dependency = vec!["other.proto".to_string()];
        proto.public_dependency = vec![1];
        assert!(build_error(&proto).contains("dependency index 1"));
    }
}
