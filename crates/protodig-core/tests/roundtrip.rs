//! Compile `.proto` text, render the descriptor, compile the rendering and
//! check that both descriptors agree.

use pretty_assertions::assert_eq;
use prost::Message;
use prost_types::{DescriptorProto, FileDescriptorProto};
use protodig_core::{extract, ProtoReconstructor, ReconstructorConfig, ScannedFile, Scanner};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const COMMON_PROTO: &str = r#"syntax = "proto3";

package shop.v1;

message Money {
  string currency = 1;
  int64 units = 2;
}
"#;

const ORDER_PROTO: &str = r#"// Order service definitions.

syntax = "proto3";

package shop.v1;

option go_package = "example.com/shop/v1;shopv1";
option java_multiple_files = true;

import "shop/v1/common.proto";

// Manages orders.
service OrderService {
  // Fetch one order.
  rpc GetOrder (GetOrderRequest) returns (Order) {}
  rpc Watch (GetOrderRequest) returns (stream Order) {}
}

message GetOrderRequest {
  string id = 1;
}

// An order.
message Order {
  reserved "legacy";
  reserved 8 to 10;

  message Line {
    string sku = 1;
    uint32 quantity = 2;
  }

  enum State {
    STATE_UNSPECIFIED = 0;
    STATE_OPEN = 1;
  }

  string id = 1; // primary key
  repeated Line lines = 2;
  map<string, string> labels = 3;
  Money total = 4;
  State state = 5;
  oneof payment {
    string card = 11;
    string voucher = 12;
  }
  optional string note = 13;
}

enum Channel {
  CHANNEL_UNSPECIFIED = 0;
  CHANNEL_WEB = 1 [deprecated = true];
}
"#;

const LEGACY_PROTO: &str = r#"syntax = "proto2";

package legacy;

option optimize_for = LITE_RUNTIME;

message Config {
  extensions 100 to max;

  enum Mode {
    SLOW = 1;
    FAST = 2;
  }

  required string name = 1 [default = "none"];
  optional int32 retries = 2 [default = 3, deprecated = true];
  repeated int32 ids = 3 [packed = true];
  optional Mode mode = 4 [default = FAST];
  optional bytes blob = 5;
  optional double ratio = 6 [default = 0.5];
  oneof choice {
    string a = 7;
    int32 b = 8;
  }
}

extend Config {
  optional string extra = 100;
  repeated int32 more = 101;
}
"#;

fn write(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn compile(dir: &Path, name: &str) -> FileDescriptorProto {
    let mut compiler = protox::Compiler::new([dir]).unwrap();
    compiler.include_source_info(true);
    compiler.include_imports(false);
    compiler.open_file(name).unwrap();
    compiler
        .file_descriptor_set()
        .file
        .into_iter()
        .find(|f| f.name() == name)
        .unwrap()
}

/// Drops what rendering is free to change: comments and declaration order
fn normalize(mut file: FileDescriptorProto) -> FileDescriptorProto {
    file.source_code_info = None;
    for message in &mut file.message_type {
        normalize_message(message);
    }
    file
}

fn normalize_message(message: &mut DescriptorProto) {
    message.field.sort_by_key(|f| f.number());
    message.nested_type.sort_by(|a, b| a.name().cmp(b.name()));
    for nested in &mut message.nested_type {
        normalize_message(nested);
    }
}

/// Compiles `name`, renders it, compiles the rendering, returns both descriptors and the text
fn roundtrip(
    sources: &[(&str, &str)],
    name: &str,
) -> (FileDescriptorProto, FileDescriptorProto, String) {
    let original_dir = TempDir::new().unwrap();
    for (file, contents) in sources {
        write(original_dir.path(), file, contents);
    }
    let original = compile(original_dir.path(), name);

    let rendered = ProtoReconstructor::from_proto(original.clone())
        .unwrap()
        .render();
    assert_eq!(rendered.source_name, name);

    let rendered_dir = TempDir::new().unwrap();
    for (file, contents) in sources {
        if *file != name {
            write(rendered_dir.path(), file, contents);
        }
    }
    write(rendered_dir.path(), name, &rendered.text);
    let recompiled = compile(rendered_dir.path(), name);

    (original, recompiled, rendered.text)
}

#[test]
fn proto3_roundtrip() {
    let sources = [
        ("shop/v1/common.proto", COMMON_PROTO),
        ("shop/v1/order.proto", ORDER_PROTO),
    ];
    let (original, recompiled, text) = roundtrip(&sources, "shop/v1/order.proto");

    assert!(text.contains("// Order service definitions.\n"));
    assert!(text.contains("// Manages orders.\nservice OrderService {\n"));
    assert!(text.contains("  // Fetch one order.\n  rpc GetOrder (.shop.v1.GetOrderRequest) returns (.shop.v1.Order) {}\n"));
    assert!(text.contains("  rpc Watch (.shop.v1.GetOrderRequest) returns (stream .shop.v1.Order) {}\n"));
    assert!(text.contains("  string id = 1; // primary key\n"));
    assert!(text.contains("  map<string, string> labels = 3;\n"));
    assert!(text.contains("  optional string note = 13;\n"));
    assert!(text.contains("  reserved 8 to 10;\n"));
    assert!(!text.contains("LabelsEntry"));

    assert_eq!(normalize(original), normalize(recompiled));
}

#[test]
fn proto2_roundtrip() {
    let sources = [("legacy.proto", LEGACY_PROTO)];
    let (original, recompiled, text) = roundtrip(&sources, "legacy.proto");

    assert!(text.contains("option optimize_for = LITE_RUNTIME;\n"));
    assert!(text.contains("  extensions 100 to max;\n"));
    assert!(text.contains("  required string name = 1 [default = \"none\"];\n"));
    assert!(text.contains("  optional .legacy.Config.Mode mode = 4 [default = FAST];\n"));
    assert!(text.contains("extend .legacy.Config {\n  optional string extra = 100;\n  repeated int32 more = 101;\n}\n"));

    assert_eq!(normalize(original), normalize(recompiled));
}

#[test]
fn scanned_descriptor_matches_direct_render() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "legacy.proto", LEGACY_PROTO);
    let descriptor = compile(dir.path(), "legacy.proto");

    let mut binary = b"\x7fELF\x02\x01\x01\x00 some text section ".to_vec();
    binary.extend(descriptor.encode_to_vec());
    binary.extend_from_slice(&[0u8; 16]);

    let file = ScannedFile::new(binary, &Scanner::new());
    let extractions = extract(&file, &ReconstructorConfig::default());
    assert_eq!(extractions.len(), 1);

    let scanned = extractions[0].result.as_ref().unwrap();
    let direct = ProtoReconstructor::from_proto(descriptor).unwrap().render();
    assert_eq!(scanned, &direct);
}
