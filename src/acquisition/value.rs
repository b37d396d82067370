// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Decoding of raw PLC words into typed sample values
//!
//! The FINS transport deals exclusively in 16-bit words; this module turns
//! word slices back into the declared tag types. 32-bit values arrive high
//! word first, exactly as the transport returns them — no extra byte
//! swapping happens here.

use log::warn;

use crate::config::DataType;

/// One decoded sample value.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Bool(bool),
    /// Raw channel word, rendered as four uppercase hex digits.
    Channel(u16),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Real32(f32),
    Text(String),
}

impl TagValue {
    /// CSV field representation. Booleans render as `True`/`False`, channel
    /// words as hex, floats in their shortest round-trip decimal form.
    pub fn to_csv_field(&self) -> String {
        match self {
            TagValue::Bool(true) => "True".to_string(),
            TagValue::Bool(false) => "False".to_string(),
            TagValue::Channel(w) => format!("{:04X}", w),
            TagValue::Int16(v) => v.to_string(),
            TagValue::Uint16(v) => v.to_string(),
            TagValue::Int32(v) => v.to_string(),
            TagValue::Uint32(v) => v.to_string(),
            TagValue::Real32(v) => v.to_string(),
            TagValue::Text(s) => s.clone(),
        }
    }
}

/// Decode the raw words read for one tag into its declared type.
///
/// A BOOL word must be exactly 0 or 1; anything else is malformed on the
/// PLC side and decodes as false with a warning naming the tag.
pub fn decode(data_type: DataType, words: &[u16], tag_name: &str) -> TagValue {
    match data_type {
        DataType::Bool => {
            let word = words.first().copied().unwrap_or(0);
            match word {
                0 => TagValue::Bool(false),
                1 => TagValue::Bool(true),
                other => {
                    warn!(
                        "Malformed BOOL word {:#06x} for tag '{}', decoding as false",
                        other, tag_name
                    );
                    TagValue::Bool(false)
                }
            }
        }
        DataType::Channel => TagValue::Channel(words.first().copied().unwrap_or(0)),
        DataType::Int16 => TagValue::Int16(words.first().copied().unwrap_or(0) as i16),
        DataType::Uint16 => TagValue::Uint16(words.first().copied().unwrap_or(0)),
        DataType::Int32 => TagValue::Int32(combine_words(words) as i32),
        DataType::Uint32 => TagValue::Uint32(combine_words(words)),
        DataType::Real32 => TagValue::Real32(f32::from_bits(combine_words(words))),
        DataType::Str(n) => TagValue::Text(decode_string(words, usize::from(n))),
    }
}

/// Join two consecutive words, high word first.
fn combine_words(words: &[u16]) -> u32 {
    let high = words.first().copied().unwrap_or(0);
    let low = words.get(1).copied().unwrap_or(0);
    (u32::from(high) << 16) | u32::from(low)
}

/// Unpack big-endian word bytes into a string of at most `max_len` bytes,
/// cut at the first NUL.
fn decode_string(words: &[u16], max_len: usize) -> String {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for word in words {
        bytes.extend_from_slice(&word.to_be_bytes());
    }
    bytes.truncate(max_len);
    if let Some(nul) = bytes.iter().position(|b| *b == 0) {
        bytes.truncate(nul);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_decodes_only_one_as_true() {
        assert_eq!(decode(DataType::Bool, &[0], "t"), TagValue::Bool(false));
        assert_eq!(decode(DataType::Bool, &[1], "t"), TagValue::Bool(true));
        // Nonzero-but-not-one words are malformed and coerce to false.
        assert_eq!(decode(DataType::Bool, &[2], "t"), TagValue::Bool(false));
        assert_eq!(decode(DataType::Bool, &[0x8000], "t"), TagValue::Bool(false));
    }

    #[test]
    fn thirty_two_bit_values_are_high_word_first() {
        assert_eq!(
            decode(DataType::Uint32, &[0x0001, 0x0000], "t"),
            TagValue::Uint32(0x0001_0000)
        );
        assert_eq!(
            decode(DataType::Int32, &[0xFFFF, 0xFFFF], "t"),
            TagValue::Int32(-1)
        );
        assert_eq!(
            decode(DataType::Real32, &[0x3F80, 0x0000], "t"),
            TagValue::Real32(1.0)
        );
    }

    #[test]
    fn strings_are_cut_at_the_first_nul() {
        // "AB" "C\0" -> "ABC"
        let words = [0x4142, 0x4300, 0x5858];
        assert_eq!(
            decode(DataType::Str(6), &words, "t"),
            TagValue::Text("ABC".to_string())
        );
        // Full length without NUL keeps max_len bytes.
        let words = [0x4142, 0x4344];
        assert_eq!(
            decode(DataType::Str(3), &words, "t"),
            TagValue::Text("ABC".to_string())
        );
    }

    #[test]
    fn csv_fields_follow_the_column_contract() {
        assert_eq!(TagValue::Bool(true).to_csv_field(), "True");
        assert_eq!(TagValue::Bool(false).to_csv_field(), "False");
        assert_eq!(TagValue::Channel(0x8080).to_csv_field(), "8080");
        assert_eq!(TagValue::Int16(-12).to_csv_field(), "-12");
        assert_eq!(TagValue::Real32(1.5).to_csv_field(), "1.5");
        // Small magnitudes keep their significant digits instead of being
        // padded to a fixed number of decimal places.
        assert_eq!(TagValue::Real32(0.0000123).to_csv_field(), "0.0000123");
        assert_eq!(TagValue::Text("ok".into()).to_csv_field(), "ok");
    }
}
