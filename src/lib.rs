// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Edge bridge that polls OMRON PLCs over FINS/UDP and forwards the decoded
//! samples to an OPC UA server, falling back to per-PLC CSV capture whenever
//! the server is unavailable.

pub mod acquisition;
pub mod config;
pub mod daemon;
pub mod fins;
pub mod logging;
pub mod sink;

pub use config::Config;
pub use daemon::launch_daemon::{BridgeOutcome, Daemon};
