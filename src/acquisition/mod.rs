// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-PLC acquisition engine
//!
//! The read planner, the word decoder, the per-cycle sample buffer and the
//! acquisition loop that ties them to the FINS transport and the sinks.

pub mod daemon;
pub mod planner;
pub mod sample;
pub mod value;

pub use daemon::{AcquisitionLoop, ExitReason, LoopExit, LoopOptions};
pub use planner::{plan_read_groups, ReadGroup};
pub use sample::SampleBuffer;
pub use value::TagValue;
