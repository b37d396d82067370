// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Scripted collaborators for acquisition-loop tests: a FINS device serving
//! values from an in-memory word table and an OPC UA link recording writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;

use fins_opcua_bridge::acquisition::TagValue;
use fins_opcua_bridge::config::{DataType, MemoryArea, PlcConfig, TagMapping};
use fins_opcua_bridge::fins::{CpuUnitDetails, FinsDevice, FinsError};
use fins_opcua_bridge::sink::opcua::OpcuaLink;

#[derive(Default)]
pub struct DeviceCounters {
    pub batch_reads: AtomicUsize,
    pub single_reads: AtomicUsize,
}

/// FINS device stand-in backed by a word table.
pub struct MockDevice {
    pub cpu_ok: bool,
    pub fail_batches: bool,
    pub fail_all_reads: bool,
    pub memory: HashMap<(MemoryArea, u16), u16>,
    pub counters: Arc<DeviceCounters>,
}

impl MockDevice {
    pub fn new(memory: HashMap<(MemoryArea, u16), u16>) -> Self {
        MockDevice {
            cpu_ok: true,
            fail_batches: false,
            fail_all_reads: false,
            memory,
            counters: Arc::new(DeviceCounters::default()),
        }
    }

    fn words(&self, area: MemoryArea, start: u16, count: u16) -> Vec<u16> {
        (0..count)
            .map(|i| self.memory.get(&(area, start + i)).copied().unwrap_or(0))
            .collect()
    }

    fn timeout() -> FinsError {
        FinsError::Timeout { attempts: 3 }
    }
}

#[async_trait]
impl FinsDevice for MockDevice {
    async fn connect(&mut self) -> Result<(), FinsError> {
        Ok(())
    }

    async fn disconnect(&mut self) {}

    async fn cpu_unit_details_read(&mut self) -> Result<CpuUnitDetails, FinsError> {
        if self.cpu_ok {
            Ok(CpuUnitDetails {
                unit_name: "CJ2M-CPU33".to_string(),
                boot_version: "1.0".to_string(),
                model_number: "CJ2M".to_string(),
                os_version: "2.0".to_string(),
            })
        } else {
            Err(Self::timeout())
        }
    }

    async fn read(
        &mut self,
        area: MemoryArea,
        address: u16,
        data_type: DataType,
    ) -> Result<Vec<u16>, FinsError> {
        self.counters.single_reads.fetch_add(1, Ordering::Relaxed);
        if self.fail_all_reads {
            return Err(Self::timeout());
        }
        Ok(self.words(area, address, data_type.word_width()))
    }

    async fn batch_read(
        &mut self,
        area: MemoryArea,
        start: u16,
        count: u16,
        data_type: DataType,
    ) -> Result<Vec<u16>, FinsError> {
        self.counters.batch_reads.fetch_add(1, Ordering::Relaxed);
        if self.fail_all_reads || self.fail_batches {
            return Err(Self::timeout());
        }
        Ok(self.words(area, start, count * data_type.word_width()))
    }
}

/// OPC UA link stand-in recording every write batch it accepts.
pub struct MockOpcua {
    pub connect_ok: bool,
    /// Write call index (0-based) from which writes fail.
    pub fail_writes_from: Option<usize>,
    pub writes: Arc<Mutex<Vec<Vec<(String, TagValue)>>>>,
    calls: usize,
}

impl MockOpcua {
    pub fn new(connect_ok: bool) -> Self {
        MockOpcua {
            connect_ok,
            fail_writes_from: None,
            writes: Arc::new(Mutex::new(Vec::new())),
            calls: 0,
        }
    }
}

#[async_trait]
impl OpcuaLink for MockOpcua {
    async fn connect(&mut self, _url: &str, _reload: bool, _cancel: &AtomicBool) -> Result<()> {
        if self.connect_ok {
            Ok(())
        } else {
            bail!("no OPC UA server answered")
        }
    }

    async fn write_all(&mut self, entries: Vec<(String, TagValue)>) -> Result<()> {
        let call = self.calls;
        self.calls += 1;
        if let Some(from) = self.fail_writes_from {
            if call >= from {
                bail!("server rejected the write");
            }
        }
        self.writes.lock().unwrap().push(entries);
        Ok(())
    }

    fn disconnect(&mut self) {}
}

pub fn tag(name: &str, area: MemoryArea, address: u16, data_type: DataType) -> TagMapping {
    TagMapping {
        tag_name: name.to_string(),
        memory_area: area,
        address,
        data_type,
    }
}

pub fn plc_config(name: &str, mappings: Vec<TagMapping>) -> PlcConfig {
    PlcConfig {
        plc_name: name.to_string(),
        plc_ip: "192.168.1.10".to_string(),
        opcua_url: "opc.tcp://127.0.0.1:4840".to_string(),
        sleep_interval: 0.001,
        address_mappings: mappings,
    }
}
