// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-PLC log files
//!
//! Every acquisition loop owns a `logs/<plc_name>.log` append file that
//! records state transitions and non-transient errors. The file handle is a
//! private resource of the loop — there is no process-wide handler registry.
//! Messages are mirrored to the console through the global logger, which
//! stays the only shared logging state.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Local;

/// Default directory for per-PLC log files.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Append-only log writer for one PLC.
pub struct PlcLogger {
    plc_name: String,
    file: Option<File>,
}

impl PlcLogger {
    /// Open (or create) `logs/<plc_name>.log` for appending.
    pub fn create(plc_name: &str) -> Self {
        Self::create_in(Path::new(DEFAULT_LOG_DIR), plc_name)
    }

    /// Open the log file under an explicit directory. A file that cannot be
    /// opened degrades to console-only logging instead of killing the loop.
    pub fn create_in(dir: &Path, plc_name: &str) -> Self {
        let file = fs::create_dir_all(dir)
            .and_then(|_| {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(dir.join(format!("{}.log", plc_name)))
            })
            .map_err(|e| {
                log::warn!(
                    "Could not open log file for PLC '{}': {} (console only)",
                    plc_name,
                    e
                );
            })
            .ok();
        PlcLogger {
            plc_name: plc_name.to_string(),
            file,
        }
    }

    pub fn info(&mut self, message: &str) {
        log::info!(target: "plc", "[{}] {}", self.plc_name, message);
        self.write_line("INFO", message);
    }

    pub fn warn(&mut self, message: &str) {
        log::warn!(target: "plc", "[{}] {}", self.plc_name, message);
        self.write_line("WARNING", message);
    }

    pub fn error(&mut self, message: &str) {
        log::error!(target: "plc", "[{}] {}", self.plc_name, message);
        self.write_line("ERROR", message);
    }

    fn write_line(&mut self, level: &str, message: &str) {
        if let Some(file) = &mut self.file {
            let _ = writeln!(
                file,
                "{} - {} - {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                self.plc_name,
                level,
                message
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_levelled_lines_to_the_plc_file() {
        let dir = tempdir().unwrap();
        let mut logger = PlcLogger::create_in(dir.path(), "line-a");
        logger.info("state: Init -> FinsConnecting");
        logger.error("read of tag 'temp' failed");

        let contents = fs::read_to_string(dir.path().join("line-a.log")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(" - line-a - INFO - state: Init -> FinsConnecting"));
        assert!(lines[1].contains(" - line-a - ERROR - read of tag 'temp' failed"));
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let dir = tempdir().unwrap();
        {
            let mut logger = PlcLogger::create_in(dir.path(), "line-a");
            logger.info("first run");
        }
        {
            let mut logger = PlcLogger::create_in(dir.path(), "line-a");
            logger.info("second run");
        }
        let contents = fs::read_to_string(dir.path().join("line-a.log")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
