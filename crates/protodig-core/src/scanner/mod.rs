//! Binary scanning module for finding embedded protobuf descriptors.
//!
//! This module locates serialized `FileDescriptorProto` messages inside an
//! arbitrary byte buffer. Nothing in the buffer indexes them, so the scanner
//! anchors on the file name, which protoc always encodes first.
//!
//! ## Algorithm Overview
//!
//! 1. Search the unconsumed part of the buffer for the `.proto` byte sequence
//! 2. Backtrack to the nearest `0x0A` byte (field 1, wire type LEN) whose
//!    length prefix ends the string exactly after `.proto` and whose string is
//!    printable ASCII
//! 3. If a varint right before that start looks like an outer length prefix,
//!    take the message length from it
//! 4. Otherwise walk records forward until the message visibly ends
//!
//! A failed occurrence is skipped one byte at a time, and every backward
//! search stays inside the unconsumed window, so the total work is bounded by
//! the buffer length.
//!
//! ## Limitations
//!
//! The forward walk stops before a second field-1 record, assuming adjacent
//! descriptors are laid out back to back with their name first. A descriptor
//! that repeats field 1, or declares it later, is mis-segmented.

mod wire;

use crate::error::{Error, Result};
use bytes::Bytes;
use std::ops::Range;
use std::path::Path;
use tracing::{debug, trace};

pub use wire::{consume_field, decode_tag, decode_varint, Tag, WireType, MAX_VALID_NUMBER};

/// Pattern to search for in binaries (filename suffix)
const PROTO_SUFFIX: &[u8] = b".proto";

/// Magic byte indicating start of FileDescriptorProto
/// This is field 1 (name) with wire type 2 (LEN): (1 << 3) | 2 = 0x0A
const MAGIC_BYTE: u8 = 0x0A;

/// Widths tried for an outer length prefix, longest first
const PREFIX_WIDTHS: [usize; 4] = [4, 3, 2, 1];

/// Byte range of one embedded descriptor within the scanned buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CandidateRange {
    /// Offset of the first byte (the field-1 tag)
    pub start: usize,
    /// Number of bytes in the message
    pub len: usize,
}

impl CandidateRange {
    /// Creates a new candidate range
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// Offset one past the last byte
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// The range as a standard library range
    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }

    /// Borrows the candidate's bytes out of the scanned buffer
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.range()]
    }
}

/// Configuration for the scanner
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Maximum number of descriptors to find (0 = unlimited)
    pub max_results: usize,
    /// Bytes an outer length prefix must cover beyond the file name
    pub min_prefix_margin: usize,
    /// Emit per-attempt diagnostics while scanning
    pub verbose: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_results: 0,
            min_prefix_margin: 50,
            verbose: false,
        }
    }
}

impl ScannerConfig {
    /// Creates a new scanner config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of results to return
    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Sets the minimum content an outer length prefix must cover
    pub fn min_prefix_margin(mut self, margin: usize) -> Self {
        self.min_prefix_margin = margin;
        self
    }

    /// Enables per-attempt diagnostic events
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Trait for implementing custom scanning strategies
///
/// Scanning never fails: malformed input yields fewer candidates.
pub trait ScanStrategy: Send + Sync {
    /// Scan the provided data for protobuf descriptors
    fn scan(&self, data: &[u8]) -> Vec<CandidateRange>;
}

/// A validated start of an embedded descriptor
#[derive(Debug, Clone, Copy)]
struct RecordStart {
    /// Offset of the field-1 tag
    position: usize,
    /// Length of the file name string
    name_len: usize,
}

/// Primary scanner for finding embedded protobuf descriptors
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    config: ScannerConfig,
}

impl Scanner {
    /// Creates a new scanner with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new scanner with custom configuration
    pub fn with_config(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Returns the scanner configuration
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Find the start of a FileDescriptorProto by backtracking from a `.proto` match.
    ///
    /// Only bytes in `window_start..suffix_pos` are considered.
    fn find_record_start(
        &self,
        data: &[u8],
        window_start: usize,
        suffix_pos: usize,
    ) -> Option<RecordStart> {
        let name_end = suffix_pos + PROTO_SUFFIX.len();
        let mut search_end = suffix_pos;

        while let Some(relative) = data[window_start..search_end]
            .iter()
            .rposition(|&b| b == MAGIC_BYTE)
        {
            let position = window_start + relative;
            search_end = position;

            if self.config.verbose {
                trace!("Checking candidate tag at offset {}", position);
            }

            let (declared_len, varint_len) = match decode_varint(&data[position + 1..]) {
                Ok(decoded) => decoded,
                Err(e) => {
                    if self.config.verbose {
                        trace!("Rejected tag at {}: {}", position, e);
                    }
                    continue;
                }
            };

            let name_start = position + 1 + varint_len;
            let computed_end = usize::try_from(declared_len)
                .ok()
                .and_then(|len| name_start.checked_add(len));

            if computed_end != Some(name_end) {
                if self.config.verbose {
                    trace!(
                        "Rejected tag at {}: string would end at {:?}, expected {}",
                        position,
                        computed_end,
                        name_end
                    );
                }
                continue;
            }

            let name = &data[name_start..name_end];
            if name.is_empty() || !name.iter().all(|b| (0x20..=0x7E).contains(b)) {
                if self.config.verbose {
                    trace!("Rejected tag at {}: file name is not printable", position);
                }
                continue;
            }

            return Some(RecordStart {
                position,
                name_len: name.len(),
            });
        }

        None
    }

    /// Look for a varint ending exactly at the record start that covers the record.
    fn find_length_prefix(
        &self,
        data: &[u8],
        window_start: usize,
        start: RecordStart,
    ) -> Option<usize> {
        let min_len = start.name_len + self.config.min_prefix_margin;

        for width in PREFIX_WIDTHS {
            let Some(prefix_start) = start.position.checked_sub(width) else {
                continue;
            };
            if prefix_start < window_start {
                continue;
            }

            let Ok((value, varint_len)) = decode_varint(&data[prefix_start..]) else {
                continue;
            };
            let Ok(length) = usize::try_from(value) else {
                continue;
            };

            if varint_len == width
                && length >= min_len
                && start.position.checked_add(length).is_some_and(|end| end <= data.len())
            {
                if self.config.verbose {
                    trace!(
                        "Length prefix at {} ({} bytes wide): {} bytes",
                        prefix_start,
                        width,
                        length
                    );
                }
                return Some(length);
            }
        }

        None
    }

    /// Consumes protobuf records starting from the given position.
    ///
    /// Returns the number of bytes that belong to the message.
    fn consume_record(&self, data: &[u8], start: usize) -> Result<usize> {
        let mut position = start;
        let mut consumed_field_one = false;

        while position < data.len() {
            let (field_number, length) = match consume_field(&data[position..]) {
                Ok(record) => record,
                Err(e) if e.is_end_of_message() => break,
                Err(e) => return Err(Error::scan_boundary(start, e.offset_by(position))),
            };

            if length == 0 {
                break;
            }

            // Field 1 again means the next descriptor starts here
            if field_number == 1 {
                if consumed_field_one {
                    if self.config.verbose {
                        trace!("Found adjacent descriptor at position {}", position);
                    }
                    break;
                }
                consumed_field_one = true;
            }

            position += length;
        }

        Ok(position - start)
    }
}

impl ScanStrategy for Scanner {
    fn scan(&self, data: &[u8]) -> Vec<CandidateRange> {
        let mut results = Vec::new();
        let mut window_start = 0;

        debug!("Starting scan of {} bytes", data.len());

        while window_start < data.len() {
            let Some(relative_pos) = find_subsequence(&data[window_start..], PROTO_SUFFIX) else {
                break;
            };
            let suffix_pos = window_start + relative_pos;

            if self.config.verbose {
                trace!("Found .proto suffix at position {}", suffix_pos);
            }

            let Some(record_start) = self.find_record_start(data, window_start, suffix_pos) else {
                if self.config.verbose {
                    trace!("No valid start before {}, skipping", suffix_pos);
                }
                window_start = suffix_pos + 1;
                continue;
            };

            let record_len = match self.find_length_prefix(data, window_start, record_start) {
                Some(length) => length,
                None => match self.consume_record(data, record_start.position) {
                    Ok(length) => length,
                    Err(e) => {
                        debug!("{}", e);
                        window_start = suffix_pos + 1;
                        continue;
                    }
                },
            };

            if record_len == 0 {
                window_start = suffix_pos + 1;
                continue;
            }

            let candidate = CandidateRange::new(record_start.position, record_len);
            debug!(
                "Found descriptor at {}..{} ({} bytes)",
                candidate.start,
                candidate.end(),
                candidate.len
            );
            results.push(candidate);

            if self.config.max_results > 0 && results.len() >= self.config.max_results {
                break;
            }

            window_start = candidate.end();
        }

        debug!("Scan complete: found {} descriptors", results.len());
        results
    }
}

/// Find a subsequence within a byte slice
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// A buffer together with the descriptor candidates found in it
#[derive(Debug, Clone)]
pub struct ScannedFile {
    data: Bytes,
    candidates: Vec<CandidateRange>,
}

impl ScannedFile {
    /// Scans `data` with the given strategy
    pub fn new(data: impl Into<Bytes>, strategy: &impl ScanStrategy) -> Self {
        let data = data.into();
        let candidates = strategy.scan(&data);
        Self { data, candidates }
    }

    /// The full scanned buffer
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Candidates in buffer order
    pub fn candidates(&self) -> &[CandidateRange] {
        &self.candidates
    }

    /// The bytes of one candidate, sharing the scanned buffer
    pub fn payload(&self, candidate: &CandidateRange) -> Bytes {
        self.data.slice(candidate.range())
    }

    /// Iterates over every candidate's bytes
    pub fn payloads(&self) -> impl Iterator<Item = Bytes> + '_ {
        self.candidates.iter().map(|c| self.payload(c))
    }
}

/// Scan a file for embedded protobuf descriptors
///
/// Reading the file is the only fallible step.
pub fn scan_file(path: impl AsRef<Path>, config: &ScannerConfig) -> Result<ScannedFile> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
    trace!("Read {} bytes from {}", data.len(), path.display());
    Ok(ScannedFile::new(data, &Scanner::with_config(config.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto};

    fn descriptor(name: &str, package: &str, message: &str) -> Vec<u8> {
        use prost_types::field_descriptor_proto::{Label, Type};

        let field = |name: &str, number: i32| FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            label: Some(Label::Optional as i32),
            r#type: Some(Type::String as i32),
            ..Default::default()
        };

        FileDescriptorProto {
            name: Some(name.to_string()),
            package: Some(package.to_string()),
            message_type: vec![DescriptorProto {
                name: Some(message.to_string()),
                field: vec![field("display_name", 1), field("description", 2)],
                ..Default::default()
            }],
            syntax: Some("proto3".to_string()),
            ..Default::default()
        }
        .encode_to_vec()
    }

    fn scan(data: &[u8]) -> Vec<CandidateRange> {
        Scanner::with_config(ScannerConfig::new().verbose(true)).scan(data)
    }

    #[test]
    fn test_find_subsequence() {
        let data = b"hello.proto.world";
        assert_eq!(find_subsequence(data, b".proto"), Some(5));
        assert_eq!(find_subsequence(data, b"world"), Some(12));
        assert_eq!(find_subsequence(data, b"missing"), None);
    }

    #[test]
    fn test_scanner_config_builder() {
        let config = ScannerConfig::new()
            .max_results(10)
            .min_prefix_margin(20)
            .verbose(true);

        assert_eq!(config.max_results, 10);
        assert_eq!(config.min_prefix_margin, 20);
        assert!(config.verbose);
    }

    #[test]
    fn test_empty_input() {
        assert!(scan(&[]).is_empty());
    }

    #[test]
    fn test_no_proto_suffix() {
        let data = b"this is just some random data without any protobuf content";
        assert!(scan(data).is_empty());
    }

    #[test]
    fn test_back_to_back_descriptors_are_split() {
        let a = descriptor("a.proto", "example.alpha", "Alpha");
        let b = descriptor("b.proto", "example.beta", "Beta");

        let mut data = vec![0u8; 8];
        data.extend_from_slice(&a);
        data.extend_from_slice(&b);
        data.extend_from_slice(&[0, 0, 0, 0]);

        let results = scan(&data);
        assert_eq!(
            results,
            vec![
                CandidateRange::new(8, a.len()),
                CandidateRange::new(8 + a.len(), b.len()),
            ]
        );
        assert!(results[0].end() <= results[1].start);

        let first = FileDescriptorProto::decode(results[0].slice(&data)).unwrap();
        let second = FileDescriptorProto::decode(results[1].slice(&data)).unwrap();
        assert_eq!(first.name(), "a.proto");
        assert_eq!(second.name(), "b.proto");
        assert_eq!(second.package(), "example.beta");
    }

    #[test]
    fn test_outer_length_prefix_bounds_the_message() {
        let inner = descriptor("widgets/catalog.proto", "example.widgets", "Widget");
        assert!(inner.len() >= "widgets/catalog.proto".len() + 50);

        let mut data = vec![0u8; 6];
        data.push(0x12);
        prost::encoding::encode_varint(inner.len() as u64, &mut data);
        let start = data.len();
        data.extend_from_slice(&inner);
        // Garbage that the forward walk would reject
        data.extend_from_slice(&[0x12, 0xFF, 0xFF, 0xFF]);

        assert_eq!(scan(&data), vec![CandidateRange::new(start, inner.len())]);
    }

    #[test]
    fn test_short_prefix_falls_back_to_forward_walk() {
        let inner = descriptor("a.proto", "p", "M");
        let mut data = vec![0x03];
        data.extend_from_slice(&inner);
        data.push(0x00);

        assert_eq!(scan(&data), vec![CandidateRange::new(1, inner.len())]);
    }

    #[test]
    fn test_backtracks_past_length_byte_that_looks_like_a_tag() {
        // "abcd.proto" is ten bytes, so its length prefix is itself 0x0A
        let mut data = vec![0x0A, 0x0A];
        data.extend_from_slice(b"abcd.proto");
        data.push(0x00);

        assert_eq!(scan(&data), vec![CandidateRange::new(0, 12)]);
    }

    #[test]
    fn test_name_only_descriptor_at_end_of_buffer() {
        let mut data = vec![0x0A, 0x07];
        data.extend_from_slice(b"a.proto");

        assert_eq!(scan(&data), vec![CandidateRange::new(0, 9)]);
    }

    #[test]
    fn test_rejects_unprintable_name() {
        let mut data = vec![0x0A, 0x08, 0x01];
        data.extend_from_slice(b"a.proto");
        data.push(0x00);

        assert!(scan(&data).is_empty());
    }

    #[test]
    fn test_invalid_varint_before_marker_terminates() {
        let mut data = vec![0x0A];
        data.extend_from_slice(&[0xFF; 12]);
        data.extend_from_slice(b"x.proto");

        assert!(scan(&data).is_empty());
    }

    #[test]
    fn test_truncated_record_skips_candidate() {
        let mut data = vec![0x0A, 0x07];
        data.extend_from_slice(b"a.proto");
        // Field 2, LEN 80, but the buffer ends
        data.extend_from_slice(&[0x12, 0x50, b'x']);

        assert!(scan(&data).is_empty());
    }

    #[test]
    fn test_failed_occurrence_does_not_hide_later_descriptor() {
        let good = descriptor("good.proto", "p", "M");
        let mut data = b"junk.proto junk ".to_vec();
        let start = data.len();
        data.extend_from_slice(&good);
        data.push(0x00);

        assert_eq!(scan(&data), vec![CandidateRange::new(start, good.len())]);
    }

    #[test]
    fn test_max_results() {
        let a = descriptor("a.proto", "p", "A");
        let b = descriptor("b.proto", "p", "B");
        let mut data = a.clone();
        data.extend_from_slice(&b);

        let scanner = Scanner::with_config(ScannerConfig::new().max_results(1));
        assert_eq!(scanner.scan(&data), vec![CandidateRange::new(0, a.len())]);
    }

    #[test]
    fn test_adversarial_input_terminates() {
        let mut data = Vec::new();
        for i in 0..2000u32 {
            data.push(0x0A);
            data.push((i % 251) as u8);
            data.extend_from_slice(b".proto");
        }
        // Only termination matters here
        let _ = scan(&data);
    }

    #[test]
    fn test_scanned_file_payloads_share_buffer() {
        let a = descriptor("a.proto", "p", "A");
        let file = ScannedFile::new(a.clone(), &Scanner::new());

        assert_eq!(file.candidates().len(), 1);
        let payloads: Vec<Bytes> = file.payloads().collect();
        assert_eq!(payloads[0].as_ref(), a.as_slice());
    }

    #[test]
    fn test_scan_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let mut data = vec![0u8; 32];
        data.extend_from_slice(&descriptor("a.proto", "p", "A"));
        std::fs::write(&path, &data).unwrap();

        let file = scan_file(&path, &ScannerConfig::default()).unwrap();
        assert_eq!(file.candidates().len(), 1);
        assert_eq!(file.candidates()[0].start, 32);

        let missing = scan_file(dir.path().join("missing.bin"), &ScannerConfig::default());
        assert!(matches!(missing, Err(Error::FileRead { .. })));
    }
}
