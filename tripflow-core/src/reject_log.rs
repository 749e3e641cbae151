//! Append-only report of rows excluded from loading.
//!
//! The report is sectioned by rejection reason. Each section carries a title,
//! the source header row, and the rejected rows exactly as they appeared in
//! the source, so a section can be cut out and re-read as CSV.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::{StringRecord, WriterBuilder};
use tracing::debug;

use crate::errors::{IngestError, Result};
use crate::record::{RejectReason, RejectedRow};

pub trait RejectSink: Send {
    /// Records the rejections of the chunk starting at `offset`.
    fn append(&mut self, headers: &StringRecord, offset: u64, rejected: &[RejectedRow])
        -> Result<()>;
}

impl RejectSink for Vec<RejectedRow> {
    fn append(&mut self, _: &StringRecord, _: u64, rejected: &[RejectedRow]) -> Result<()> {
        self.extend_from_slice(rejected);
        Ok(())
    }
}

pub struct RejectLog {
    path: PathBuf,
    file: File,
}

impl RejectLog {
    /// Starts a fresh report, replacing any previous content.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(path.into(), false)
    }

    /// Continues an existing report, creating it if needed.
    pub fn append_to(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(path.into(), true)
    }

    fn open(path: PathBuf, append: bool) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| IngestError::RejectLog {
                path: path.clone(),
                source,
            })?;
        }
        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let file = options.open(&path).map_err(|source| IngestError::RejectLog {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn render(headers: &StringRecord, offset: u64, reason: RejectReason, rows: &[&RejectedRow])
        -> std::result::Result<Vec<u8>, csv::Error> {
        let mut out = format!(
            "=== {} [{}] (chunk offset {}) ===\n",
            reason.title(),
            reason.tag(),
            offset
        )
        .into_bytes();
        {
            let mut writer = WriterBuilder::new().has_headers(false).from_writer(&mut out);
            writer.write_record(headers)?;
            for row in rows {
                writer.write_record(&row.fields)?;
            }
            writer.flush()?;
        }
        out.push(b'\n');
        Ok(out)
    }
}

impl RejectSink for RejectLog {
    fn append(&mut self, headers: &StringRecord, offset: u64, rejected: &[RejectedRow]) -> Result<()> {
        if rejected.is_empty() {
            return Ok(());
        }

        let mut by_reason: BTreeMap<RejectReason, Vec<&RejectedRow>> = BTreeMap::new();
        for row in rejected {
            by_reason.entry(row.reason).or_default().push(row);
        }

        let io_err = |source: std::io::Error| IngestError::RejectLog {
            path: self.path.clone(),
            source,
        };
        let mut section = Vec::new();
        for (reason, rows) in &by_reason {
            let rendered = Self::render(headers, offset, *reason, rows)
                .map_err(|err| io_err(std::io::Error::other(err)))?;
            section.extend_from_slice(&rendered);
        }
        self.file.write_all(&section).map_err(io_err)?;
        self.file.sync_data().map_err(io_err)?;
        debug!(
            "Logged {} rejected rows from chunk {} to {}",
            rejected.len(),
            offset,
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(row: u64, reason: RejectReason, fields: &[&str]) -> RejectedRow {
        RejectedRow {
            row,
            reason,
            fields: StringRecord::from(fields.to_vec()),
        }
    }

    #[test]
    fn sections_keep_source_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("excluded_records.log");
        let headers = StringRecord::from(vec!["id", "vendor_id", "pickup_datetime"]);

        let mut log = RejectLog::create(&path).unwrap();
        log.append(
            &headers,
            0,
            &[
                rejected(3, RejectReason::MissingCriticalField, &["id3", "2", ""]),
                rejected(1, RejectReason::Duplicate, &["id1", "1", "2016-01-01 00:00:00"]),
            ],
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let expected = "\
=== Removed duplicate rows [duplicate] (chunk offset 0) ===
id,vendor_id,pickup_datetime
id1,1,2016-01-01 00:00:00

=== Removed rows with missing critical values [missing-critical-field] (chunk offset 0) ===
id,vendor_id,pickup_datetime
id3,2,

";
        assert_eq!(content, expected);
    }

    #[test]
    fn append_mode_keeps_previous_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("excluded.log");
        let headers = StringRecord::from(vec!["a", "b"]);
        let rows = [rejected(0, RejectReason::UnrealisticSpeed, &["1", "x,y"])];

        RejectLog::create(&path).unwrap().append(&headers, 0, &rows).unwrap();
        RejectLog::append_to(&path).unwrap().append(&headers, 5, &rows).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("[unrealistic-speed]").count(), 2);
        assert!(content.contains("1,\"x,y\""));

        RejectLog::create(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn empty_chunks_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("excluded.log");
        let mut log = RejectLog::create(&path).unwrap();
        log.append(&StringRecord::from(vec!["a"]), 0, &[]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
