//! Error taxonomy for a backup run.
//!
//! Every variant is contained at the smallest unit that produced it (one page,
//! one file, one item). A run never unwinds past its own boundary: callers
//! log these and carry on, and the outcome of a run is read from the progress
//! report instead.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackupError>;

#[derive(Debug, Error)]
pub enum BackupError {
    /// A page request was rejected by the transport or the remote answered non-2xx.
    #[error("network error on page {page_index}: {message}")]
    Network { page_index: u32, message: String },

    /// A page payload could not be unwrapped or parsed.
    #[error("decode error: {0}")]
    Decode(String),

    /// One output file could not be written.
    #[error("failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackupError {
    pub fn write(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        BackupError::Write {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
