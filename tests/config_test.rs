// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use fins_opcua_bridge::config::{Config, DataType, MemoryArea, PlcConfig, TagMapping};
use tempfile::tempdir;

fn mapping(name: &str, area: MemoryArea, address: u16, data_type: DataType) -> TagMapping {
    TagMapping {
        tag_name: name.to_string(),
        memory_area: area,
        address,
        data_type,
    }
}

#[test]
fn config_round_trips_through_json() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("plc_data.json");

    let config = Config {
        plcs: vec![PlcConfig {
            plc_name: "press-7".to_string(),
            plc_ip: "10.0.4.21".to_string(),
            opcua_url: "opc.tcp://10.0.4.2:4840".to_string(),
            sleep_interval: 0.05,
            address_mappings: vec![
                mapping("running", MemoryArea::Auxiliary, 100, DataType::Bool),
                mapping("status_word", MemoryArea::CommonIo, 12, DataType::Channel),
                mapping("count", MemoryArea::DataMemory, 500, DataType::Uint32),
                mapping("temp", MemoryArea::DataMemory, 502, DataType::Real32),
                mapping("batch_id", MemoryArea::Holding, 40, DataType::Str(12)),
            ],
        }],
    };

    config.save_to_file(&config_path)?;
    let loaded = Config::from_file(&config_path)?;

    assert_eq!(loaded.plcs.len(), 1);
    let plc = &loaded.plcs[0];
    assert_eq!(plc.plc_name, "press-7");
    assert_eq!(plc.sleep_interval, 0.05);
    assert_eq!(plc.address_mappings, config.plcs[0].address_mappings);
    assert_eq!(plc.address_mappings[4].data_type, DataType::Str(12));
    Ok(())
}

#[test]
fn sleep_interval_defaults_to_ten_milliseconds() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("plc_data.json");
    std::fs::write(
        &config_path,
        r#"[{
            "plc_name": "line-b",
            "plc_ip": "10.0.4.22",
            "opcua_url": "opc.tcp://10.0.4.2:4840",
            "address_mappings": []
        }]"#,
    )?;

    let loaded = Config::from_file(&config_path)?;
    assert_eq!(loaded.plcs[0].sleep_interval, 0.01);
    Ok(())
}

#[test]
fn malformed_json_is_a_configuration_error() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("plc_data.json");
    std::fs::write(&config_path, "{ not json")?;
    assert!(Config::from_file(&config_path).is_err());

    // Unknown data types are rejected, not defaulted.
    std::fs::write(
        &config_path,
        r#"[{
            "plc_name": "line-b",
            "plc_ip": "10.0.4.22",
            "opcua_url": "opc.tcp://10.0.4.2:4840",
            "address_mappings": [
                {"tag_name": "x", "memory_area": "D", "address": 1, "data_type": "FLOAT64"}
            ]
        }]"#,
    )?;
    assert!(Config::from_file(&config_path).is_err());
    Ok(())
}
