//! Error types for the proxy crate.

use thiserror::Error;

/// Errors that can occur while running the proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Failed to bind to the listen address.
    #[error("failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        source: std::io::Error,
    },

    /// Failed to connect to the upstream server.
    #[error("failed to connect to upstream {address}: {source}")]
    UpstreamConnectionFailed {
        address: String,
        source: std::io::Error,
    },

    /// Failed to set up the capture sink.
    #[error(transparent)]
    Capture(#[from] pgtrace_capture::CaptureError),
}
