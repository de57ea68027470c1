//! Error types for the watch pipeline, the event store and the export boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop a directory from being observed.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The watch target is missing, not a directory, or not readable.
    #[error("invalid watch path {path:?}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    /// The OS watch mechanism failed after the session started.
    #[error("watch on {root:?} was lost: {reason}")]
    WatchLost { root: PathBuf, reason: String },

    /// The notify backend could not be created.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
}

impl WatchError {
    pub fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by the event store.
///
/// Only point operations that need to hand back a value (`insert`, `get_by_id`)
/// surface these; everything else degrades to an empty or `false` result.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No connection to the database could be acquired.
    #[error("event store unavailable: {0}")]
    Unavailable(#[from] r2d2::Error),

    /// A statement failed against an open connection.
    #[error("event store query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// Errors raised while writing an export file.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write export {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors raised when handing a report to a mail transport.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),

    #[error("attachment not found: {0:?}")]
    MissingAttachment(PathBuf),

    #[error("mail transport reported failure")]
    Transport,
}
