//! Error types for fanout.
//!
//! Library crates use [`FanoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Every variant here is fatal to a run. Per-record failures never become a
//! `FanoutError`; they are written to the error artifact instead.

use std::fmt::Display;
use std::path::PathBuf;

use crate::types::WorkerId;

/// Top-level error type for all fanout operations.
#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A required column is absent from the input header.
    #[error("schema error: \"{column}\" column header missing from csv")]
    Schema { column: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Malformed CSV in the input or in a partial artifact.
    #[error("csv error in {path:?}: {message}")]
    Csv { path: PathBuf, message: String },

    /// Data validation error (bad worker count, invalid argument, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Network/HTTP client setup error.
    #[error("network error: {0}")]
    Network(String),

    /// A worker stopped before finishing its partition.
    #[error("worker {worker} failed: {message}")]
    Worker { worker: WorkerId, message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FanoutError>;

impl FanoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a schema error naming the missing column.
    pub fn schema(column: impl Into<String>) -> Self {
        Self::Schema {
            column: column.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a CSV reader/writer error with the file it came from.
    pub fn csv(path: impl Into<PathBuf>, err: impl Display) -> Self {
        Self::Csv {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Create a worker failure.
    pub fn worker(worker: WorkerId, msg: impl Into<String>) -> Self {
        Self::Worker {
            worker,
            message: msg.into(),
        }
    }
}
