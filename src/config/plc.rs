// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-PLC configuration records
//!
//! This module defines the typed form of one entry of the PLC configuration
//! file: the PLC connection parameters and its ordered list of tag mappings.
//! Memory areas and data types are exhaustive enums so the transport-level
//! coercion rules can be matched totally instead of comparing strings.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Synthetic tag that is never read from the PLC; its value is generated
/// once per cycle and always written as the last column.
pub const HEARTBEAT_TAG: &str = "HEARTBEAT";

/// OMRON PLC memory area selectable in a tag mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryArea {
    /// Data memory (D)
    #[serde(rename = "D")]
    DataMemory,
    /// Holding area (H)
    #[serde(rename = "H")]
    Holding,
    /// Work area (W)
    #[serde(rename = "W")]
    Work,
    /// Common I/O area (C)
    #[serde(rename = "C")]
    CommonIo,
    /// Auxiliary area (A)
    #[serde(rename = "A")]
    Auxiliary,
}

impl fmt::Display for MemoryArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            MemoryArea::DataMemory => "D",
            MemoryArea::Holding => "H",
            MemoryArea::Work => "W",
            MemoryArea::CommonIo => "C",
            MemoryArea::Auxiliary => "A",
        };
        f.write_str(letter)
    }
}

/// Declared data type of a tag.
///
/// BOOL and CHANNEL travel as a single 16-bit word; the 32-bit types occupy
/// two consecutive words; `Str(n)` holds an ASCII string of up to `n` bytes
/// packed two characters per word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Channel,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Real32,
    Str(u8),
}

impl DataType {
    /// Number of 16-bit words one value of this type occupies on the wire.
    pub fn word_width(&self) -> u16 {
        match self {
            DataType::Bool | DataType::Channel | DataType::Int16 | DataType::Uint16 => 1,
            DataType::Int32 | DataType::Uint32 | DataType::Real32 => 2,
            DataType::Str(n) => (u16::from(*n) + 1) / 2,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => f.write_str("BOOL"),
            DataType::Channel => f.write_str("CHANNEL"),
            DataType::Int16 => f.write_str("INT16"),
            DataType::Uint16 => f.write_str("UINT16"),
            DataType::Int32 => f.write_str("INT32"),
            DataType::Uint32 => f.write_str("UINT32"),
            DataType::Real32 => f.write_str("REAL32"),
            DataType::Str(n) => write!(f, "STRING[{}]", n),
        }
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.as_str() {
            "BOOL" => Ok(DataType::Bool),
            "CHANNEL" => Ok(DataType::Channel),
            "INT16" => Ok(DataType::Int16),
            "UINT16" => Ok(DataType::Uint16),
            "INT32" => Ok(DataType::Int32),
            "UINT32" => Ok(DataType::Uint32),
            "REAL32" => Ok(DataType::Real32),
            other => {
                if let Some(inner) = other
                    .strip_prefix("STRING[")
                    .and_then(|rest| rest.strip_suffix(']'))
                {
                    let n: u8 = inner
                        .parse()
                        .map_err(|_| format!("invalid STRING length in '{}'", s))?;
                    if n == 0 {
                        return Err(format!("STRING length must be at least 1 in '{}'", s));
                    }
                    Ok(DataType::Str(n))
                } else {
                    Err(format!("unknown data type '{}'", s))
                }
            }
        }
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One named PLC memory location with its declared data type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagMapping {
    /// Tag name, unique within one PLC. Also the OPC UA browse name.
    pub tag_name: String,
    /// Memory area the tag lives in.
    pub memory_area: MemoryArea,
    /// Word offset within the memory area.
    pub address: u16,
    /// Declared data type, drives transport width and decoding.
    pub data_type: DataType,
}

impl TagMapping {
    /// True when `self` starts exactly where `prev` ends, in the same memory
    /// area and with the same data type. Contiguous mappings can be served by
    /// a single batch read.
    pub fn is_contiguous_with(&self, prev: &TagMapping) -> bool {
        self.memory_area == prev.memory_area
            && self.data_type == prev.data_type
            && prev.address.checked_add(prev.data_type.word_width()) == Some(self.address)
    }
}

fn default_sleep_interval() -> f64 {
    0.01
}

/// Connection parameters and tag list for one PLC.
///
/// Records are immutable after startup; there is no dynamic reconfiguration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlcConfig {
    /// Unique PLC name, used for log and data file naming.
    pub plc_name: String,
    /// IPv4 address of the PLC.
    pub plc_ip: String,
    /// Endpoint URL of the OPC UA server samples are forwarded to.
    pub opcua_url: String,
    /// Pause between acquisition cycles, in seconds.
    #[serde(default = "default_sleep_interval")]
    pub sleep_interval: f64,
    /// Ordered tag list; declared order fixes the CSV column order.
    pub address_mappings: Vec<TagMapping>,
}

impl PlcConfig {
    /// Inter-cycle pause as a `Duration`.
    pub fn sleep_duration(&self) -> Duration {
        Duration::from_secs_f64(self.sleep_interval.max(0.0))
    }

    /// Declared tag mappings without the `HEARTBEAT` sentinel.
    pub fn readable_mappings(&self) -> Vec<TagMapping> {
        self.address_mappings
            .iter()
            .filter(|m| m.tag_name != HEARTBEAT_TAG)
            .cloned()
            .collect()
    }

    /// All column names in declared order, with `HEARTBEAT` forced last.
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .address_mappings
            .iter()
            .filter(|m| m.tag_name != HEARTBEAT_TAG)
            .map(|m| m.tag_name.clone())
            .collect();
        names.push(HEARTBEAT_TAG.to_string());
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_parsing_round_trips() {
        for raw in ["BOOL", "CHANNEL", "INT16", "UINT16", "INT32", "UINT32", "REAL32"] {
            let parsed: DataType = raw.parse().unwrap();
            assert_eq!(parsed.to_string(), raw);
        }
        let s: DataType = "STRING[11]".parse().unwrap();
        assert_eq!(s, DataType::Str(11));
        assert_eq!(s.word_width(), 6);
        assert!("STRING[0]".parse::<DataType>().is_err());
        assert!("FLOAT64".parse::<DataType>().is_err());
    }

    #[test]
    fn word_widths_match_transport_layout() {
        assert_eq!(DataType::Bool.word_width(), 1);
        assert_eq!(DataType::Channel.word_width(), 1);
        assert_eq!(DataType::Int32.word_width(), 2);
        assert_eq!(DataType::Real32.word_width(), 2);
        assert_eq!(DataType::Str(4).word_width(), 2);
        assert_eq!(DataType::Str(5).word_width(), 3);
    }

    #[test]
    fn contiguity_requires_area_type_and_consecutive_words() {
        let d100 = TagMapping {
            tag_name: "t1".into(),
            memory_area: MemoryArea::DataMemory,
            address: 100,
            data_type: DataType::Int16,
        };
        let mut d101 = d100.clone();
        d101.tag_name = "t2".into();
        d101.address = 101;
        assert!(d101.is_contiguous_with(&d100));

        let mut gap = d101.clone();
        gap.address = 103;
        assert!(!gap.is_contiguous_with(&d100));

        let mut wrong_area = d101.clone();
        wrong_area.memory_area = MemoryArea::Work;
        assert!(!wrong_area.is_contiguous_with(&d100));

        // 32-bit values advance two words per item
        let dint = TagMapping {
            tag_name: "w1".into(),
            memory_area: MemoryArea::DataMemory,
            address: 200,
            data_type: DataType::Int32,
        };
        let mut next = dint.clone();
        next.tag_name = "w2".into();
        next.address = 202;
        assert!(next.is_contiguous_with(&dint));
        next.address = 201;
        assert!(!next.is_contiguous_with(&dint));
    }

    #[test]
    fn tag_mapping_deserializes_from_config_json() {
        let raw = r#"{"tag_name":"level","memory_area":"D","address":1200,"data_type":"STRING[8]"}"#;
        let mapping: TagMapping = serde_json::from_str(raw).unwrap();
        assert_eq!(mapping.memory_area, MemoryArea::DataMemory);
        assert_eq!(mapping.data_type, DataType::Str(8));
        assert_eq!(mapping.address, 1200);
    }
}
