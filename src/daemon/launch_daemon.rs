// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Bridge supervisor
//!
//! Spawns one acquisition loop task per configured PLC plus a drain task for
//! the shared failure channel. A loop that breaches its failure threshold or
//! dies at FINS connect posts a record here; the supervisor marks it
//! terminated and makes sure it has been asked to cancel. Failed loops are
//! never restarted — that is the job of the operator's process supervisor.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::acquisition::daemon::{AcquisitionLoop, ExitReason, LoopExit, LoopOptions};
use crate::config::Config;
use crate::fins::FinsUdpClient;
use crate::sink::opcua::OpcuaEndpoint;

struct LoopTask {
    plc_name: String,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<LoopExit>,
}

/// Owner of the acquisition loop set and their failure channel.
#[derive(Default)]
pub struct Daemon {
    loops: Vec<LoopTask>,
    drain: Option<JoinHandle<()>>,
}

impl Daemon {
    pub fn new() -> Self {
        Daemon::default()
    }

    /// Spawn one acquisition loop per configured PLC and the drain task.
    pub fn launch(&mut self, config: &Config, options: LoopOptions) -> Result<()> {
        let capacity = config.plcs.len().max(1);
        let (failure_tx, failure_rx) = mpsc::channel::<LoopExit>(capacity);
        let mut registry: HashMap<String, Arc<AtomicBool>> = HashMap::new();

        for plc in &config.plcs {
            let ip: Ipv4Addr = plc
                .plc_ip
                .parse()
                .with_context(|| format!("Invalid IPv4 address for PLC '{}'", plc.plc_name))?;

            let cancel = Arc::new(AtomicBool::new(false));
            registry.insert(plc.plc_name.clone(), Arc::clone(&cancel));

            let device = FinsUdpClient::new(ip);
            let endpoint = OpcuaEndpoint::default();
            let task = AcquisitionLoop::new(
                plc.clone(),
                device,
                endpoint,
                options.clone(),
                Arc::clone(&cancel),
                failure_tx.clone(),
            );
            let handle = tokio::spawn(task.run());
            info!("Spawned acquisition loop for PLC '{}'", plc.plc_name);

            self.loops.push(LoopTask {
                plc_name: plc.plc_name.clone(),
                cancel,
                handle,
            });
        }

        // The channel closes once the last loop drops its sender, which ends
        // the drain task.
        drop(failure_tx);
        self.drain = Some(tokio::spawn(drain_failures(failure_rx, registry)));
        Ok(())
    }

    /// Cancellation flags of every loop, for the shutdown coordinator.
    pub fn cancel_flags(&self) -> Vec<Arc<AtomicBool>> {
        self.loops.iter().map(|l| Arc::clone(&l.cancel)).collect()
    }

    /// Ask every loop to stop. Idempotent; loops observe the flag between
    /// cycles and after each suspension point.
    pub fn shutdown(&self) {
        info!("Cancelling all acquisition loops");
        for task in &self.loops {
            task.cancel.store(true, Ordering::Relaxed);
        }
    }

    /// Wait for every loop to reach its terminal state and summarise.
    pub async fn join(self) -> BridgeOutcome {
        let mut exits = Vec::new();
        let mut panicked = 0usize;

        for task in self.loops {
            match task.handle.await {
                Ok(exit) => exits.push(exit),
                Err(e) => {
                    error!("Acquisition loop for '{}' aborted: {}", task.plc_name, e);
                    panicked += 1;
                }
            }
        }
        if let Some(drain) = self.drain {
            let _ = drain.await;
        }

        println!();
        for exit in &exits {
            println!("PLC {:<20} {}", exit.plc_name, exit.reason);
            info!("PLC '{}' terminated: {}", exit.plc_name, exit.reason);
        }

        BridgeOutcome { exits, panicked }
    }
}

/// Consume failure records in arrival order. Each record marks its loop
/// terminated in the registry and re-asserts its cancel flag, which is a
/// no-op for a loop already draining.
async fn drain_failures(
    mut failure_rx: mpsc::Receiver<LoopExit>,
    mut registry: HashMap<String, Arc<AtomicBool>>,
) {
    while let Some(exit) = failure_rx.recv().await {
        error!("PLC '{}' loop failed: {}", exit.plc_name, exit.reason);
        if let Some(cancel) = registry.remove(&exit.plc_name) {
            cancel.store(true, Ordering::Relaxed);
        }
    }
}

/// Aggregate result of a bridge run, mapped to the process exit code.
pub struct BridgeOutcome {
    pub exits: Vec<LoopExit>,
    panicked: usize,
}

impl BridgeOutcome {
    /// 0 when every loop shut down cleanly; 2 when any loop failed at FINS
    /// connect; 3 when any loop breached a failure threshold.
    pub fn exit_code(&self) -> i32 {
        if self
            .exits
            .iter()
            .any(|e| e.reason == ExitReason::FinsUnreachable)
        {
            2
        } else if self.panicked > 0
            || self.exits.iter().any(|e| {
                matches!(
                    e.reason,
                    ExitReason::ReadThreshold | ExitReason::WriteThreshold
                )
            })
        {
            3
        } else {
            0
        }
    }
}
