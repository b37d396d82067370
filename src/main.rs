// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the FINS to OPC UA bridge

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};

use fins_opcua_bridge::acquisition::daemon::LoopOptions;
use fins_opcua_bridge::config::Config;
use fins_opcua_bridge::daemon::launch_daemon::Daemon;
use fins_opcua_bridge::daemon::shutdown;

/// Bridge OMRON PLCs to an OPC UA server over FINS/UDP
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pass a node-map reload request through to the OPC UA node manager
    #[arg(long)]
    reload: bool,

    /// Path to the PLC configuration JSON file
    #[arg(short = 'c', long, default_value = "plc_data.json")]
    config: PathBuf,

    /// Always write CSV capture alongside OPC UA
    #[arg(long)]
    csv: bool,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let code = run(args).await;
    std::process::exit(code);
}

async fn run(args: Args) -> i32 {
    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return 1;
        }
    };
    if config.plcs.is_empty() {
        warn!("No PLCs configured in {:?}, nothing to do", args.config);
        return 0;
    }
    info!(
        "Loaded {} PLC(s) from {:?} (csv: {}, reload: {})",
        config.plcs.len(),
        args.config,
        args.csv,
        args.reload
    );

    let options = LoopOptions {
        csv_enabled: args.csv,
        reload: args.reload,
        ..LoopOptions::default()
    };

    let mut daemon = Daemon::new();
    if let Err(e) = daemon.launch(&config, options) {
        error!("Failed to launch acquisition loops: {:#}", e);
        return 1;
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    shutdown::install(daemon.cancel_flags(), Arc::clone(&interrupted));

    let outcome = daemon.join().await;
    if interrupted.load(Ordering::Relaxed) {
        shutdown::INTERRUPT_EXIT_CODE
    } else {
        outcome.exit_code()
    }
}
