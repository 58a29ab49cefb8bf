//! Capture output configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the protocol capture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Path of the capture file. Opened in append mode for the whole
    /// process lifetime.
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Include the socket descriptor pair (from, to) in every line.
    #[serde(default)]
    pub output_sockets: bool,

    /// Dump every relayed chunk as hex to per-session files.
    #[serde(default)]
    pub save_traffic: bool,

    /// Directory for traffic dumps when `save_traffic` is set.
    #[serde(default = "default_traffic_dir")]
    pub traffic_dir: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            output_sockets: false,
            save_traffic: false,
            traffic_dir: default_traffic_dir(),
        }
    }
}

fn default_output() -> PathBuf {
    PathBuf::from("pgtrace.out")
}

fn default_traffic_dir() -> PathBuf {
    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.output, PathBuf::from("pgtrace.out"));
        assert!(!config.output_sockets);
        assert!(!config.save_traffic);
    }
}
