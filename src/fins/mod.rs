// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! OMRON FINS protocol support
//!
//! This module provides the FINS/UDP client the acquisition loops poll
//! through. The protocol surface is deliberately narrow: connect, a CPU-unit
//! identity read used as a reachability probe, word reads (single and batch)
//! and disconnect. Values cross this boundary as raw 16-bit words; decoding
//! into typed samples happens in the acquisition layer.

pub mod client;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{DataType, MemoryArea};

pub use client::{FinsUdpClient, DEFAULT_FINS_PORT};

/// Errors raised by the FINS transport. The acquisition loop treats every
/// variant as a read failure for threshold accounting.
#[derive(Debug, Error)]
pub enum FinsError {
    #[error("FINS I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FINS response timeout after {attempts} attempts")]
    Timeout { attempts: usize },

    #[error("FINS socket not connected")]
    NotConnected,

    #[error("PLC returned FINS end code {main_code:#04x}{sub_code:02x}")]
    EndCode { main_code: u8, sub_code: u8 },

    #[error("FINS response truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("FINS read of {words} words exceeds the {max} word command limit")]
    OversizedRead { words: u16, max: u16 },
}

/// Identity block returned by the CPU UNIT DATA READ command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuUnitDetails {
    pub unit_name: String,
    pub boot_version: String,
    pub model_number: String,
    pub os_version: String,
}

/// Asynchronous FINS device the acquisition loop reads from.
///
/// `FinsUdpClient` is the production implementation; tests substitute a
/// scripted mock to drive failure scenarios without a PLC on the bench.
#[async_trait]
pub trait FinsDevice: Send {
    /// Open the transport. UDP has no handshake, so a successful return only
    /// means the local socket exists; use [`cpu_unit_details_read`] to
    /// confirm the peer is actually alive.
    ///
    /// [`cpu_unit_details_read`]: FinsDevice::cpu_unit_details_read
    async fn connect(&mut self) -> Result<(), FinsError>;

    /// Close the transport. Never fails; errors during close are dropped.
    async fn disconnect(&mut self);

    /// Read the CPU unit identity block, confirming end-to-end reachability.
    async fn cpu_unit_details_read(&mut self) -> Result<CpuUnitDetails, FinsError>;

    /// Read one value of `data_type` at `address`, returned as raw words.
    async fn read(
        &mut self,
        area: MemoryArea,
        address: u16,
        data_type: DataType,
    ) -> Result<Vec<u16>, FinsError>;

    /// Read `count` consecutive values of `data_type` starting at `start`,
    /// in a single round-trip. Returns `count * width` raw words.
    async fn batch_read(
        &mut self,
        area: MemoryArea,
        start: u16,
        count: u16,
        data_type: DataType,
    ) -> Result<Vec<u16>, FinsError>;
}

/// FINS word-access memory area code for each configurable area.
pub(crate) fn area_word_code(area: MemoryArea) -> u8 {
    match area {
        MemoryArea::CommonIo => 0xB0,
        MemoryArea::Work => 0xB1,
        MemoryArea::Holding => 0xB2,
        MemoryArea::Auxiliary => 0xB3,
        MemoryArea::DataMemory => 0x82,
    }
}
