// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-PLC acquisition loop
//!
//! One loop task per configured PLC: connect over FINS, confirm the CPU unit
//! answers, attach the OPC UA sink, then cycle read → decode → dispatch
//! until cancelled or the failure threshold trips. The loop owns all of its
//! resources (FINS socket, OPC UA session, CSV file, log file) and closes
//! them on every exit path.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::config::{PlcConfig, HEARTBEAT_TAG};
use crate::fins::FinsDevice;
use crate::logging::{PlcLogger, DEFAULT_LOG_DIR};
use crate::sink::csv::CsvSink;
use crate::sink::opcua::OpcuaLink;
use crate::sink::sink_mode;

use super::planner::{plan_read_groups, ReadGroup};
use super::sample::SampleBuffer;
use super::value::{decode, TagValue};

/// Consecutive failed cycles (reads or writes) that terminate a loop.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Why an acquisition loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Cooperative shutdown; not an error.
    Clean,
    /// FINS connect or the CPU-unit probe failed at startup.
    FinsUnreachable,
    /// Three consecutive cycles without a single successful read.
    ReadThreshold,
    /// Three consecutive cycles with failing OPC UA dispatch.
    WriteThreshold,
}

impl ExitReason {
    pub fn is_abnormal(&self) -> bool {
        !matches!(self, ExitReason::Clean)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Clean => f.write_str("clean shutdown"),
            ExitReason::FinsUnreachable => f.write_str("fins_unreachable"),
            ExitReason::ReadThreshold => f.write_str("read_threshold"),
            ExitReason::WriteThreshold => f.write_str("write_threshold"),
        }
    }
}

/// Record a loop posts on the supervisor's failure channel when it drains.
#[derive(Debug, Clone)]
pub struct LoopExit {
    pub plc_name: String,
    pub reason: ExitReason,
}

/// Lifecycle states, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Init,
    FinsConnecting,
    OpcuaConnecting,
    Running,
    Draining,
    Terminated,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Init => "Init",
            LoopState::FinsConnecting => "FinsConnecting",
            LoopState::OpcuaConnecting => "OpcuaConnecting",
            LoopState::Running => "Running",
            LoopState::Draining => "Draining",
            LoopState::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

/// Operator options fixed for the lifetime of a loop.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// The `--csv` flag: always write CSV alongside OPC UA.
    pub csv_enabled: bool,
    /// The `--reload` flag, passed through to the node-mapper collaborator.
    pub reload: bool,
    /// Root under which `PLC_Data/` is created.
    pub data_root: PathBuf,
    /// Directory for per-PLC log files.
    pub log_root: PathBuf,
}

impl Default for LoopOptions {
    fn default() -> Self {
        LoopOptions {
            csv_enabled: false,
            reload: false,
            data_root: PathBuf::from("."),
            log_root: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

/// Outcome of the read phase of one cycle.
#[derive(Debug, Default, Clone, Copy)]
struct CycleStats {
    succeeded: usize,
    failed: usize,
}

/// Acquisition loop for a single PLC.
pub struct AcquisitionLoop<D: FinsDevice, L: OpcuaLink> {
    config: PlcConfig,
    device: D,
    opcua: L,
    options: LoopOptions,
    cancel: Arc<AtomicBool>,
    failure_tx: mpsc::Sender<LoopExit>,
    state: LoopState,
}

impl<D: FinsDevice, L: OpcuaLink> AcquisitionLoop<D, L> {
    pub fn new(
        config: PlcConfig,
        device: D,
        opcua: L,
        options: LoopOptions,
        cancel: Arc<AtomicBool>,
        failure_tx: mpsc::Sender<LoopExit>,
    ) -> Self {
        AcquisitionLoop {
            config,
            device,
            opcua,
            options,
            cancel,
            failure_tx,
            state: LoopState::Init,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn transition(&mut self, logger: &mut PlcLogger, next: LoopState) {
        logger.info(&format!("state: {} -> {}", self.state, next));
        self.state = next;
    }

    /// Run the loop to completion. Every exit path closes the sinks in
    /// reverse order (OPC UA, CSV, FINS) and reports abnormal exits on the
    /// failure channel.
    pub async fn run(mut self) -> LoopExit {
        let plc_name = self.config.plc_name.clone();
        let started_at = Local::now();
        let mut logger = PlcLogger::create_in(&self.options.log_root, &plc_name);

        println!();
        println!("==== PLC {} ====", plc_name);
        println!("  PLC IP        : {}", self.config.plc_ip);
        println!("  OPC UA server : {}", self.config.opcua_url);
        println!("  Started       : {}", started_at.format("%Y-%m-%d %H:%M:%S"));
        logger.info(&format!(
            "Initialising acquisition loop for {} at {} (OPC UA {})",
            plc_name, self.config.plc_ip, self.config.opcua_url
        ));

        let mut csv = CsvSink::new(
            &self.options.data_root,
            &plc_name,
            self.config.column_names(),
            started_at,
        );

        let reason = self.lifecycle(&mut logger, &mut csv).await;

        // Draining: close sinks in reverse order, then report.
        self.transition(&mut logger, LoopState::Draining);
        logger.info(&format!("Draining (reason: {})", reason));

        self.opcua.disconnect();
        if reason == ExitReason::FinsUnreachable {
            if let Err(e) = csv.discard() {
                logger.error(&format!("Could not remove CSV file after failed startup: {}", e));
            }
        } else {
            csv.close();
        }
        self.device.disconnect().await;

        if reason.is_abnormal() {
            let exit = LoopExit {
                plc_name: plc_name.clone(),
                reason,
            };
            if self.failure_tx.send(exit).await.is_err() {
                logger.warn("Supervisor failure channel is closed");
            }
        }

        self.transition(&mut logger, LoopState::Terminated);
        LoopExit { plc_name, reason }
    }

    /// Connect phase plus the running cycle loop. Returns the exit reason;
    /// the caller owns the draining sequence.
    async fn lifecycle(&mut self, logger: &mut PlcLogger, csv: &mut CsvSink) -> ExitReason {
        self.transition(logger, LoopState::FinsConnecting);
        println!("1. FINS connection check");

        if let Err(e) = self.device.connect().await {
            logger.error(&format!("Could not open FINS connection: {}", e));
            println!("   ❌ Unsuccessful connection to PLC");
            return ExitReason::FinsUnreachable;
        }
        // UDP does not detect a dead peer; the CPU-unit probe does.
        match self.device.cpu_unit_details_read().await {
            Ok(details) => {
                logger.info(&format!(
                    "Connected to PLC {} at {} (unit '{}', model '{}')",
                    self.config.plc_name, self.config.plc_ip, details.unit_name, details.model_number
                ));
                println!("   ✅ Connected to PLC (unit: {})", details.unit_name);
            }
            Err(e) => {
                logger.error(&format!("CPU unit details read failed: {}", e));
                println!("   ❌ Unsuccessful connection to PLC");
                return ExitReason::FinsUnreachable;
            }
        }
        if self.cancelled() {
            return ExitReason::Clean;
        }

        self.transition(logger, LoopState::OpcuaConnecting);
        println!("2. OPC UA connection check");

        let url = self.config.opcua_url.clone();
        let reload = self.options.reload;
        let cancel = Arc::clone(&self.cancel);
        let mut opcua_up = match self.opcua.connect(&url, reload, &cancel).await {
            Ok(()) => {
                logger.info(&format!("Connected to OPC UA server at {}", url));
                println!("   ✅ Connected to OPC UA server");
                true
            }
            Err(e) => {
                logger.error(&format!("OPC UA connection failed: {}", e));
                logger.warn("Continuing in CSV fallback mode");
                println!("   ❌ OPC UA unavailable, falling back to CSV");
                false
            }
        };
        if self.options.csv_enabled || !opcua_up {
            println!("   📁 CSV capture: {}", csv.path().display());
        }
        if self.cancelled() {
            return ExitReason::Clean;
        }

        let readable = self.config.readable_mappings();
        let groups = plan_read_groups(&readable);
        let mut samples = SampleBuffer::new(self.config.column_names());

        self.transition(logger, LoopState::Running);
        logger.info(&format!(
            "Running: {} tags in {} read groups, mode {:?}, cycle pause {:?}",
            readable.len(),
            groups.len(),
            sink_mode(self.options.csv_enabled, opcua_up),
            self.config.sleep_duration()
        ));
        println!("   ✅ PLC {} running in continuous mode", self.config.plc_name);

        let mut read_failures: u32 = 0;
        let mut write_failures: u32 = 0;

        loop {
            if self.cancelled() {
                return ExitReason::Clean;
            }

            samples.reset();
            let stats = self.run_reads(&groups, &mut samples, logger).await;
            if self.cancelled() {
                return ExitReason::Clean;
            }

            // The heartbeat is true only when every planned tag obtained a
            // value this cycle, whichever path delivered it.
            samples.insert(HEARTBEAT_TAG, TagValue::Bool(stats.failed == 0));
            let now = Local::now();

            if opcua_up {
                let entries: Vec<(String, TagValue)> = samples
                    .iter()
                    .filter_map(|(name, value)| value.map(|v| (name.to_string(), v.clone())))
                    .collect();
                match self.opcua.write_all(entries).await {
                    Ok(()) => write_failures = 0,
                    Err(e) => {
                        opcua_up = false;
                        write_failures += 1;
                        logger.error(&format!("OPC UA write failed: {}", e));
                        logger.warn("OPC UA connection lost, switching to CSV fallback");
                    }
                }
            }

            if self.options.csv_enabled || !opcua_up {
                if let Err(e) = csv.write_row(now, &samples) {
                    // CSV is the last resort; its failures never count
                    // toward a threshold.
                    logger.error(&format!("CSV write failed: {}", e));
                }
            }

            if stats.succeeded > 0 {
                read_failures = 0;
            } else {
                read_failures += 1;
            }

            if read_failures >= FAILURE_THRESHOLD {
                logger.error(&format!(
                    "{} consecutive cycles without a successful read, stopping loop",
                    read_failures
                ));
                return ExitReason::ReadThreshold;
            }
            if write_failures >= FAILURE_THRESHOLD {
                logger.error(&format!(
                    "{} consecutive cycles with failed OPC UA writes, stopping loop",
                    write_failures
                ));
                return ExitReason::WriteThreshold;
            }

            let pause = self.config.sleep_duration();
            if pause.is_zero() {
                tokio::task::yield_now().await;
            } else {
                sleep(pause).await;
            }
        }
    }

    /// Execute every planned read group in order, decoding into the buffer.
    async fn run_reads(
        &mut self,
        groups: &[ReadGroup],
        samples: &mut SampleBuffer,
        logger: &mut PlcLogger,
    ) -> CycleStats {
        let mut stats = CycleStats::default();
        for group in groups {
            if self.cancelled() {
                break;
            }
            match group {
                ReadGroup::Batch {
                    area,
                    start,
                    data_type,
                    tags,
                } => {
                    match self
                        .device
                        .batch_read(*area, *start, tags.len() as u16, *data_type)
                        .await
                    {
                        Ok(words) => {
                            let width = data_type.word_width() as usize;
                            for (i, tag) in tags.iter().enumerate() {
                                let chunk = &words[i * width..(i + 1) * width];
                                samples.insert(
                                    &tag.tag_name,
                                    decode(tag.data_type, chunk, &tag.tag_name),
                                );
                                stats.succeeded += 1;
                            }
                        }
                        Err(e) => {
                            logger.warn(&format!(
                                "Batch read of {} tags at {}{} failed ({}), retrying individually",
                                tags.len(),
                                area,
                                start,
                                e
                            ));
                            for tag in tags {
                                if self.read_single(tag, samples, logger).await {
                                    stats.succeeded += 1;
                                } else {
                                    stats.failed += 1;
                                }
                            }
                        }
                    }
                }
                ReadGroup::Single(tag) => {
                    if self.read_single(tag, samples, logger).await {
                        stats.succeeded += 1;
                    } else {
                        stats.failed += 1;
                    }
                }
            }
        }
        stats
    }

    /// Read one tag; a failure leaves its value null for this cycle.
    async fn read_single(
        &mut self,
        tag: &crate::config::TagMapping,
        samples: &mut SampleBuffer,
        logger: &mut PlcLogger,
    ) -> bool {
        match self
            .device
            .read(tag.memory_area, tag.address, tag.data_type)
            .await
        {
            Ok(words) => {
                samples.insert(&tag.tag_name, decode(tag.data_type, &words, &tag.tag_name));
                true
            }
            Err(e) => {
                logger.error(&format!(
                    "Read of tag '{}' ({}{}) failed: {}",
                    tag.tag_name, tag.memory_area, tag.address, e
                ));
                false
            }
        }
    }
}
