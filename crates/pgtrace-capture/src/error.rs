//! Error types for the capture crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while setting up or writing the capture file.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Failed to open the capture file.
    #[error("failed to open capture file {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
