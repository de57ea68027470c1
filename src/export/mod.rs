//! Export functionality for query results
//!
//! This module turns ordered event sequences into CSV files, either as the
//! five display columns or as the full persisted column set.

pub mod mail;

use std::fs;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Local, Utc};
use crate::core::Event;
use crate::error::ExportError;

pub use mail::{send_report, validate_email, ReportMailer};

/// Header for display-row exports.
pub const DISPLAY_HEADER: [&str; 5] = ["Filename", "Extension", "Path", "Event", "Timestamp"];

/// Header for whole-table exports.
pub const FULL_HEADER: [&str; 9] = [
    "ID",
    "Filename",
    "Path",
    "Extension",
    "Event",
    "Timestamp",
    "File Size",
    "Is Directory",
    "User",
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}

/// One event as shown in a results table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRow {
    pub filename: String,
    pub extension: String,
    pub path: String,
    pub event: String,
    pub timestamp: String,
}

impl DisplayRow {
    /// Builds a row; the path is shown relative to `root` when it lies inside it.
    pub fn from_event(event: &Event, root: Option<&Path>) -> Self {
        let path = root
            .and_then(|root| event.file_path().strip_prefix(root).ok())
            .unwrap_or_else(|| event.file_path());

        Self {
            filename: event.filename().to_string(),
            extension: event.display_extension().to_string(),
            path: path.display().to_string(),
            event: event.event_type().to_string(),
            timestamp: format_timestamp(event.timestamp()),
        }
    }

    pub fn fields(&self) -> [&str; 5] {
        [
            &self.filename,
            &self.extension,
            &self.path,
            &self.event,
            &self.timestamp,
        ]
    }
}

/// Writes event sequences as CSV, preserving the order they are given in.
pub struct CsvExporter;

impl CsvExporter {
    /// Display columns, one row per event.
    pub fn export_rows<P: AsRef<Path>>(
        output_path: P,
        events: &[Event],
        root: Option<&Path>,
    ) -> Result<usize, ExportError> {
        let mut content = csv_line(DISPLAY_HEADER);
        for event in events {
            content.push_str(&csv_line(DisplayRow::from_event(event, root).fields()));
        }

        write_file(output_path.as_ref(), &content)?;
        tracing::info!(path = %output_path.as_ref().display(), rows = events.len(), "csv exported");
        Ok(events.len())
    }

    /// Full persisted column set, one row per event.
    pub fn export_full<P: AsRef<Path>>(output_path: P, events: &[Event]) -> Result<usize, ExportError> {
        let mut content = csv_line(FULL_HEADER);
        for event in events {
            let id = event.id().map(|id| id.to_string()).unwrap_or_default();
            let path = event.file_path().display().to_string();
            let timestamp = format_timestamp(event.timestamp());
            let size = event.file_size().map(|s| s.to_string()).unwrap_or_default();
            let is_dir = event.is_directory().to_string();

            content.push_str(&csv_line([
                id.as_str(),
                event.filename(),
                path.as_str(),
                event.extension(),
                event.event_type().as_str(),
                timestamp.as_str(),
                size.as_str(),
                is_dir.as_str(),
                event.user(),
            ]));
        }

        write_file(output_path.as_ref(), &content)?;
        tracing::info!(path = %output_path.as_ref().display(), rows = events.len(), "full csv exported");
        Ok(events.len())
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), ExportError> {
    fs::write(path, content).map_err(|source| ExportError::Io {
        path: PathBuf::from(path),
        source,
    })
}

fn csv_line<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let mut line = fields.into_iter().map(escape_field).collect::<Vec<_>>().join(",");
    line.push_str("\r\n");
    line
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
