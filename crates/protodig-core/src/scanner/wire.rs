//! Low-level protobuf wire format walking.
//!
//! The scanner never decodes values, it only needs to know how many bytes
//! each record occupies so it can find where an embedded message ends.
//!
//! ## Wire Format Overview
//!
//! Each record is a varint tag (`field_number << 3 | wire_type`) followed by
//! a payload whose size depends on the wire type:
//!
//! - 0: VARINT
//! - 1: I64, eight bytes
//! - 2: LEN, varint length then that many bytes
//! - 3/4: SGROUP/EGROUP, nested records up to the matching end tag
//! - 5: I32, four bytes

use crate::error::{Error, Result};

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    Len = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width
    I32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::I32),
            _ => Err(Error::invalid_wire_format(
                0,
                format!("reserved wire type: {}", value),
            )),
        }
    }
}

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_VALID_NUMBER: u32 = 536_870_911;

/// Maximum encoded width of a 64-bit varint
const MAX_VARINT_LEN: usize = 10;

/// Group nesting accepted before the data is considered garbage
const MAX_GROUP_DEPTH: usize = 100;

/// A decoded record tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// Field number, always within `1..=MAX_VALID_NUMBER`
    pub field_number: u32,
    /// Wire type of the payload
    pub wire_type: WireType,
}

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed. Fails when
/// the input ends inside the varint or when the encoding overflows 64 bits.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;

    for (i, &byte) in data.iter().take(MAX_VARINT_LEN).enumerate() {
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            return Err(Error::varint_decode(i));
        }

        result |= ((byte & 0x7F) as u64) << (7 * i);

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::varint_decode(data.len().min(MAX_VARINT_LEN)))
}

/// Decode a record tag, validating the field number and wire type.
pub fn decode_tag(data: &[u8]) -> Result<(Tag, usize)> {
    let (raw, tag_len) = decode_varint(data)?;

    let number = raw >> 3;
    if number == 0 || number > MAX_VALID_NUMBER as u64 {
        return Err(Error::InvalidFieldNumber {
            number,
            max: MAX_VALID_NUMBER,
        });
    }

    let wire_type = WireType::try_from((raw & 0x07) as u8)?;

    Ok((
        Tag {
            field_number: number as u32,
            wire_type,
        },
        tag_len,
    ))
}

/// Consume a single protobuf record from the data.
///
/// Returns the field number and total bytes consumed (tag and payload).
/// A top-level end-group tag is an error.
pub fn consume_field(data: &[u8]) -> Result<(u32, usize)> {
    let (tag, tag_len) = decode_tag(data)?;

    if tag.wire_type == WireType::EndGroup {
        return Err(Error::invalid_wire_format(0, "unexpected end group"));
    }

    let value_len = consume_value(&data[tag_len..], tag, 0).map_err(|e| e.offset_by(tag_len))?;
    Ok((tag.field_number, tag_len + value_len))
}

fn consume_value(data: &[u8], tag: Tag, depth: usize) -> Result<usize> {
    match tag.wire_type {
        WireType::Varint => {
            let (_, len) = decode_varint(data)?;
            Ok(len)
        }
        WireType::I64 => fixed_width(data, 8),
        WireType::I32 => fixed_width(data, 4),
        WireType::Len => {
            let (length, prefix_len) = decode_varint(data)?;
            let total = usize::try_from(length)
                .ok()
                .and_then(|length| length.checked_add(prefix_len))
                .filter(|&total| total <= data.len())
                .ok_or_else(|| {
                    Error::invalid_wire_format(
                        prefix_len,
                        format!(
                            "not enough bytes for LEN field (need {}, have {})",
                            length,
                            data.len() - prefix_len
                        ),
                    )
                })?;
            Ok(total)
        }
        WireType::StartGroup => consume_group(data, tag.field_number, depth + 1),
        WireType::EndGroup => Err(Error::invalid_wire_format(0, "unexpected end group")),
    }
}

fn fixed_width(data: &[u8], width: usize) -> Result<usize> {
    if data.len() < width {
        return Err(Error::invalid_wire_format(
            0,
            format!("not enough bytes for {}-byte fixed field", width),
        ));
    }
    Ok(width)
}

/// Consume records up to and including the end-group tag matching `number`.
fn consume_group(data: &[u8], number: u32, depth: usize) -> Result<usize> {
    if depth > MAX_GROUP_DEPTH {
        return Err(Error::invalid_wire_format(0, "group nesting too deep"));
    }

    let mut position = 0;
    loop {
        let (tag, tag_len) = decode_tag(&data[position..]).map_err(|e| e.offset_by(position))?;
        position += tag_len;

        if tag.wire_type == WireType::EndGroup {
            if tag.field_number != number {
                return Err(Error::invalid_wire_format(
                    position - tag_len,
                    format!("end group {} does not close group {}", tag.field_number, number),
                ));
            }
            return Ok(position);
        }

        position += consume_value(&data[position..], tag, depth).map_err(|e| e.offset_by(position))?;
    }
}
