//! Configuration types for pgtrace.
//!
//! A single YAML file holds three sections: `proxy` (listen side),
//! `upstream` (the PostgreSQL server traffic is relayed to) and `capture`
//! (the protocol capture file and its options).

pub mod capture;
pub mod proxy;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use capture::CaptureConfig;
pub use proxy::{ProxyConfig, UpstreamConfig};

/// Complete pgtrace configuration loaded from a file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PgTraceConfig {
    /// Listen-side proxy settings.
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Upstream PostgreSQL server.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Protocol capture output settings.
    #[serde(default)]
    pub capture: CaptureConfig,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PgTraceConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the rest of the system relies on.
    ///
    /// The capture output path must be set, and the chunk scratch size is
    /// clamped to the range a single protocol read may occupy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.output.as_os_str().is_empty() {
            return Err(ConfigError::Config("no capture output defined".to_string()));
        }

        if self.proxy.buffer_size == 0 || self.proxy.buffer_size > proxy::MAX_BUFFER_SIZE {
            return Err(ConfigError::Config(format!(
                "buffer_size must be within 1..={} (got {})",
                proxy::MAX_BUFFER_SIZE,
                self.proxy.buffer_size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml() {
        let config = PgTraceConfig::from_yaml(
            r#"
proxy:
  listen_port: 5433
upstream:
  host: db.internal
  port: 5432
capture:
  output: /var/log/pgtrace.out
"#,
        )
        .unwrap();

        assert_eq!(config.proxy.listen_port, 5433);
        assert_eq!(config.upstream.host, "db.internal");
        assert_eq!(
            config.capture.output.to_str().unwrap(),
            "/var/log/pgtrace.out"
        );
        // Untouched fields fall back to defaults.
        assert_eq!(config.proxy.buffer_size, proxy::DEFAULT_BUFFER_SIZE);
        assert!(!config.capture.output_sockets);
    }

    #[test]
    fn test_missing_output_rejected() {
        let result = PgTraceConfig::from_yaml(
            r#"
capture:
  output: ""
"#,
        );
        assert!(matches!(result, Err(ConfigError::Config(_))));
    }

    #[test]
    fn test_oversized_buffer_rejected() {
        let result = PgTraceConfig::from_yaml(
            r#"
proxy:
  buffer_size: 1048576
capture:
  output: trace.out
"#,
        );
        assert!(matches!(result, Err(ConfigError::Config(_))));
    }
}
