// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Process-level supervision: spawning the per-PLC acquisition loops,
//! draining their failure channel and coordinating shutdown.

pub mod launch_daemon;
pub mod shutdown;
