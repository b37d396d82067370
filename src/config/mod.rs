// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the bridge
//!
//! The bridge is configured by a single JSON file holding a top-level array
//! of PLC records. The file is loaded once at startup and validated before
//! any acquisition loop is spawned; a structural problem is fatal and maps
//! to exit code 1. There is no dynamic reconfiguration.

pub mod plc;

use std::collections::HashSet;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::debug;

pub use plc::{DataType, MemoryArea, PlcConfig, TagMapping, HEARTBEAT_TAG};

/// Root configuration: the set of PLCs this bridge instance owns.
#[derive(Debug, Clone)]
pub struct Config {
    /// One entry per PLC, in file order.
    pub plcs: Vec<PlcConfig>,
}

impl Config {
    /// Load and validate the configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading PLC configuration from {:?}", path);

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        let plcs: Vec<PlcConfig> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse JSON configuration from {:?}", path))?;

        let config = Config { plcs };
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration back to a JSON file (pretty-printed).
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.plcs)
            .context("Failed to serialize configuration to JSON")?;
        fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Structural validation beyond what serde enforces.
    pub fn validate(&self) -> Result<()> {
        let mut plc_names = HashSet::new();
        for plc in &self.plcs {
            if plc.plc_name.trim().is_empty() {
                bail!("A PLC entry has an empty plc_name");
            }
            if !plc_names.insert(plc.plc_name.as_str()) {
                bail!("Duplicate plc_name '{}' in configuration", plc.plc_name);
            }
            plc.plc_ip.parse::<Ipv4Addr>().with_context(|| {
                format!(
                    "PLC '{}' has an invalid IPv4 address '{}'",
                    plc.plc_name, plc.plc_ip
                )
            })?;
            if plc.opcua_url.trim().is_empty() {
                bail!("PLC '{}' has an empty opcua_url", plc.plc_name);
            }
            if !plc.sleep_interval.is_finite() || plc.sleep_interval < 0.0 {
                bail!(
                    "PLC '{}' has an invalid sleep_interval {} (must be a non-negative number of seconds)",
                    plc.plc_name,
                    plc.sleep_interval
                );
            }

            let mut tag_names = HashSet::new();
            for mapping in &plc.address_mappings {
                if mapping.tag_name.trim().is_empty() {
                    bail!("PLC '{}' has a mapping with an empty tag_name", plc.plc_name);
                }
                if !tag_names.insert(mapping.tag_name.as_str()) {
                    bail!(
                        "Duplicate tag_name '{}' for PLC '{}'",
                        mapping.tag_name,
                        plc.plc_name
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"[
        {
            "plc_name": "line-a",
            "plc_ip": "192.168.1.10",
            "opcua_url": "opc.tcp://127.0.0.1:4840",
            "address_mappings": [
                {"tag_name": "temp", "memory_area": "D", "address": 100, "data_type": "INT16"},
                {"tag_name": "HEARTBEAT", "memory_area": "D", "address": 0, "data_type": "BOOL"}
            ]
        }
    ]"#;

    fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plc_data.json");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_valid_configuration() {
        let (_dir, path) = write_config(SAMPLE);
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.plcs.len(), 1);
        let plc = &config.plcs[0];
        assert_eq!(plc.plc_name, "line-a");
        assert_eq!(plc.sleep_interval, 0.01);
        assert_eq!(plc.sleep_duration(), std::time::Duration::from_millis(10));
        assert_eq!(plc.readable_mappings().len(), 1);
        assert_eq!(plc.column_names(), vec!["temp", "HEARTBEAT"]);
    }

    #[test]
    fn duplicate_plc_name_is_fatal() {
        let duplicated = format!(
            "[{},{}]",
            SAMPLE.trim_start_matches('[').trim_end_matches(']'),
            SAMPLE.trim_start_matches('[').trim_end_matches(']')
        );
        let (_dir, path) = write_config(&duplicated);
        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Duplicate plc_name"));
    }

    #[test]
    fn duplicate_tag_name_is_fatal() {
        let raw = r#"[{
            "plc_name": "line-a",
            "plc_ip": "192.168.1.10",
            "opcua_url": "opc.tcp://127.0.0.1:4840",
            "address_mappings": [
                {"tag_name": "temp", "memory_area": "D", "address": 100, "data_type": "INT16"},
                {"tag_name": "temp", "memory_area": "D", "address": 101, "data_type": "INT16"}
            ]
        }]"#;
        let (_dir, path) = write_config(raw);
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn invalid_ip_is_fatal() {
        let raw = SAMPLE.replace("192.168.1.10", "not-an-ip");
        let (_dir, path) = write_config(&raw);
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn negative_sleep_interval_is_fatal() {
        let raw = r#"[{
            "plc_name": "line-a",
            "plc_ip": "192.168.1.10",
            "opcua_url": "opc.tcp://127.0.0.1:4840",
            "sleep_interval": -1.0,
            "address_mappings": []
        }]"#;
        let (_dir, path) = write_config(raw);
        assert!(Config::from_file(&path).is_err());
    }
}
