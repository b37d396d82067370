// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Shutdown coordinator
//!
//! Translates operator termination signals into cooperative cancellation of
//! every acquisition loop. The first signal sets the cancel flags and lets
//! the loops drain their sinks; a second signal during the grace period
//! forces the process down immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};

/// Exit code reported on operator interrupt, matching shell convention.
pub const INTERRUPT_EXIT_CODE: i32 = 130;

/// Install the signal handlers. Returns immediately; the watcher runs as its
/// own task for the rest of the process lifetime.
pub fn install(cancel_flags: Vec<Arc<AtomicBool>>, interrupted: Arc<AtomicBool>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        interrupted.store(true, Ordering::Relaxed);
        info!("Shutdown signal received, cancelling all acquisition loops");
        for flag in &cancel_flags {
            flag.store(true, Ordering::Relaxed);
        }

        wait_for_signal().await;
        warn!("Second shutdown signal received, exiting immediately");
        std::process::exit(INTERRUPT_EXIT_CODE);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = sigterm.recv() => {},
            }
        }
        Err(e) => {
            warn!("Could not install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
