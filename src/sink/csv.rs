// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! CSV fallback sink
//!
//! Append-only CSV capture under `PLC_Data/<plc_name>/`. The file name
//! carries a timestamp fixed at loop start, but the file itself is only
//! created by the first row that actually needs persisting — a loop that
//! never falls back to CSV leaves no artifact on disk. Every row is flushed
//! so an unexpected termination loses at most the in-flight row.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{debug, info};

use crate::acquisition::sample::SampleBuffer;

/// Root directory for per-PLC capture files.
const DATA_DIR: &str = "PLC_Data";

/// Lazily opened append-only CSV file for one PLC.
pub struct CsvSink {
    plc_name: String,
    path: PathBuf,
    columns: Vec<String>,
    writer: Option<BufWriter<File>>,
}

impl CsvSink {
    /// Plan the sink for one loop. `columns` is the declared tag order with
    /// `HEARTBEAT` last; `started_at` fixes the file name for the lifetime
    /// of the loop. Nothing touches the filesystem yet.
    pub fn new(
        data_root: &Path,
        plc_name: &str,
        columns: Vec<String>,
        started_at: DateTime<Local>,
    ) -> Self {
        let filename = format!("{}_{}.csv", plc_name, started_at.format("%Y%m%d_%H%M%S"));
        let path = data_root.join(DATA_DIR).join(plc_name).join(filename);
        CsvSink {
            plc_name: plc_name.to_string(),
            path,
            columns,
            writer: None,
        }
    }

    /// Path the sink writes to (whether or not it exists yet).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once the file has been created.
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    fn open(&mut self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);

        let mut header = String::from("timestamp");
        for column in &self.columns {
            header.push(',');
            header.push_str(&escape_field(column));
        }
        header.push('\n');
        writer.write_all(header.as_bytes())?;
        writer.flush()?;

        info!("CSV capture for '{}' opened at {:?}", self.plc_name, self.path);
        self.writer = Some(writer);
        Ok(())
    }

    /// Append one row from the cycle's sample buffer, opening the file (and
    /// creating its directories) on first use. Null values become empty
    /// fields.
    pub fn write_row(&mut self, timestamp: DateTime<Local>, samples: &SampleBuffer) -> io::Result<()> {
        if self.writer.is_none() {
            self.open()?;
        }
        let writer = self.writer.as_mut().expect("csv writer just opened");

        let mut row = timestamp.format("%Y-%m-%dT%H:%M:%S%.3f").to_string();
        for (_, value) in samples.iter() {
            row.push(',');
            if let Some(value) = value {
                row.push_str(&escape_field(&value.to_csv_field()));
            }
        }
        row.push('\n');
        writer.write_all(row.as_bytes())?;
        writer.flush()
    }

    /// Flush and close the file if it was ever opened.
    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
            debug!("CSV capture for '{}' closed", self.plc_name);
        }
    }

    /// Close and delete the file. Used when a loop dies at FINS connect so
    /// no empty per-boot file is left behind.
    pub fn discard(&mut self) -> io::Result<()> {
        let had_file = self.is_open();
        self.close();
        if had_file && self.path.exists() {
            fs::remove_file(&self.path)?;
            info!(
                "Removed CSV capture {:?} for '{}' after failed startup",
                self.path, self.plc_name
            );
        }
        Ok(())
    }
}

/// Quote a field when it contains a separator, quote or newline.
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::value::TagValue;
    use tempfile::tempdir;

    fn sink_in(dir: &Path, columns: Vec<String>) -> CsvSink {
        CsvSink::new(dir, "plc-a", columns, Local::now())
    }

    #[test]
    fn nothing_is_created_before_the_first_row() {
        let dir = tempdir().unwrap();
        let sink = sink_in(dir.path(), vec!["t1".into(), "HEARTBEAT".into()]);
        assert!(!sink.is_open());
        assert!(!dir.path().join(DATA_DIR).exists());
    }

    #[test]
    fn first_row_creates_directories_header_and_data() {
        let dir = tempdir().unwrap();
        let mut sink = sink_in(dir.path(), vec!["t1".into(), "t2".into(), "HEARTBEAT".into()]);

        let mut samples = SampleBuffer::new(vec!["t1".into(), "t2".into(), "HEARTBEAT".into()]);
        samples.insert("t1", TagValue::Int16(10));
        samples.insert("HEARTBEAT", TagValue::Bool(false));
        sink.write_row(Local::now(), &samples).unwrap();

        let contents = fs::read_to_string(sink.path()).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), "timestamp,t1,t2,HEARTBEAT");
        let row = lines.next().unwrap();
        // Null t2 is an empty field; heartbeat renders as False.
        assert!(row.ends_with(",10,,False"), "unexpected row: {}", row);
    }

    #[test]
    fn discard_removes_a_created_file() {
        let dir = tempdir().unwrap();
        let mut sink = sink_in(dir.path(), vec!["HEARTBEAT".into()]);

        let mut samples = SampleBuffer::new(vec!["HEARTBEAT".into()]);
        samples.insert("HEARTBEAT", TagValue::Bool(true));
        sink.write_row(Local::now(), &samples).unwrap();
        assert!(sink.path().exists());

        sink.discard().unwrap();
        assert!(!sink.path().exists());
    }

    #[test]
    fn discard_without_open_leaves_the_tree_as_found() {
        let dir = tempdir().unwrap();
        let mut sink = sink_in(dir.path(), vec!["HEARTBEAT".into()]);
        sink.discard().unwrap();
        assert!(!dir.path().join(DATA_DIR).exists());
    }

    #[test]
    fn fields_with_separators_are_quoted() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
