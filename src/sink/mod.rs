// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Sample sinks
//!
//! A sink is a destination for decoded samples: the OPC UA server, the
//! per-PLC CSV file, or both. The active combination follows the operator's
//! `--csv` choice and the live OPC UA connection state.

pub mod csv;
pub mod opcua;

/// Active sink combination of a running acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    OpcuaOnly,
    CsvOnly,
    Dual,
}

/// Select the sink mode from the operator's `--csv` flag and the current
/// OPC UA state. A loop without a live OPC UA session always captures to
/// CSV, whatever the flag says.
pub fn sink_mode(csv_flag: bool, opcua_up: bool) -> SinkMode {
    match (csv_flag, opcua_up) {
        (true, true) => SinkMode::Dual,
        (false, true) => SinkMode::OpcuaOnly,
        (_, false) => SinkMode::CsvOnly,
    }
}
