//! Monitoring sink: append-only CSV capture of model inputs and outputs.
//!
//! One sink owns one file for the whole process lifetime. Rows accumulate in
//! an in-memory buffer and are pushed to the file once `threshold` rows are
//! pending, so after every [`MonitoringSink::collect`] the buffer holds fewer
//! than `threshold` rows. This is a lightweight local log, not a database:
//! rows still buffered when the process dies are lost.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::monitoring::record::{header, MonitoringRecord, RecordGroup};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Flush threshold must be at least 1")]
    ZeroThreshold,
}

/// Final accounting reported when the sink is closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkSummary {
    pub path: PathBuf,
    /// Data rows written during this process lifetime (header excluded).
    pub rows_written: u64,
    /// Record groups dropped because they could not be transformed.
    pub groups_rejected: u64,
    /// Rows lost to failed flushes.
    pub rows_lost: u64,
}

/// The monitoring sink.
pub struct MonitoringSink {
    path: PathBuf,
    schema: Vec<String>,
    writer: csv::Writer<File>,
    buffer: Vec<MonitoringRecord>,
    threshold: usize,
    sync_on_flush: bool,
    rows_written: u64,
    groups_rejected: u64,
    rows_lost: u64,
}

impl MonitoringSink {
    /// Open a new timestamped capture file under `storage_dir`.
    pub fn open(
        storage_dir: &Path,
        schema: Vec<String>,
        threshold: usize,
        sync_on_flush: bool,
    ) -> Result<Self, SinkError> {
        std::fs::create_dir_all(storage_dir)?;
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let path = storage_dir.join(format!("monitoring_data_{timestamp}.csv"));
        Self::open_at(path, schema, threshold, sync_on_flush)
    }

    /// Open (or create) `path` in append mode. The header row is written
    /// only if the file is empty.
    pub fn open_at(
        path: PathBuf,
        schema: Vec<String>,
        threshold: usize,
        sync_on_flush: bool,
    ) -> Result<Self, SinkError> {
        if threshold == 0 {
            return Err(SinkError::ZeroThreshold);
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_new = file.metadata()?.len() == 0;

        let mut writer = csv::Writer::from_writer(file);
        if is_new {
            writer.write_record(header(&schema))?;
            writer.flush()?;
        }

        info!(
            path = %path.display(),
            threshold,
            sync_on_flush,
            "Monitoring sink opened"
        );

        Ok(Self {
            path,
            schema,
            writer,
            buffer: Vec::with_capacity(threshold),
            threshold,
            sync_on_flush,
            rows_written: 0,
            groups_rejected: 0,
            rows_lost: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows buffered but not yet written.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Buffer one record group, flushing once the threshold is reached.
    ///
    /// Never fails: a group that cannot be transformed is logged and dropped
    /// without touching rows already buffered, and a failed flush is logged
    /// with its rows counted as lost.
    pub fn collect(&mut self, group: RecordGroup) {
        let observations = group.observations();
        match group.into_records(&self.schema) {
            Ok(records) => self.buffer.extend(records),
            Err(e) => {
                self.groups_rejected += 1;
                error!(observations, "Error collecting monitoring data: {e}");
                return;
            }
        }

        if self.buffer.len() >= self.threshold {
            debug!(rows = self.buffer.len(), "Sink buffer is full, flushing to disk");
            if let Err(e) = self.flush() {
                error!(path = %self.path.display(), "Monitoring flush failed: {e}");
            }
        }
    }

    /// Write every buffered row and push it to the OS. The buffer is cleared
    /// even on failure.
    pub fn flush(&mut self) -> Result<(), SinkError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let rows = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.threshold));
        let count = rows.len() as u64;

        let result = self.write_rows(&rows);
        match &result {
            Ok(()) => self.rows_written += count,
            Err(_) => self.rows_lost += count,
        }
        result
    }

    fn write_rows(&mut self, rows: &[MonitoringRecord]) -> Result<(), SinkError> {
        for record in rows {
            self.writer.write_record(record.to_row())?;
        }
        self.writer.flush()?;
        if self.sync_on_flush {
            self.writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Flush remaining rows, fsync, and release the file.
    ///
    /// Consumes the sink, so it can be closed at most once and never
    /// written to afterwards.
    pub fn close(mut self) -> Result<SinkSummary, SinkError> {
        if let Err(e) = self.flush() {
            warn!("Final monitoring flush failed: {e}");
        }

        let file = self
            .writer
            .into_inner()
            .map_err(|e| SinkError::IoError(e.into_error()))?;
        file.sync_all()?;

        let summary = SinkSummary {
            path: self.path,
            rows_written: self.rows_written,
            groups_rejected: self.groups_rejected,
            rows_lost: self.rows_lost,
        };

        info!(
            path = %summary.path.display(),
            rows_written = summary.rows_written,
            groups_rejected = summary.groups_rejected,
            rows_lost = summary.rows_lost,
            "Monitoring sink closed"
        );

        Ok(summary)
    }
}
