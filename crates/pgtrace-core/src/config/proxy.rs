//! Proxy and upstream configuration types.

use serde::{Deserialize, Serialize};

/// Largest chunk a single socket read may produce.
pub const MAX_BUFFER_SIZE: usize = 65535;

/// Default chunk scratch size.
pub const DEFAULT_BUFFER_SIZE: usize = 65535;

/// Configuration for the listen side of the proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Port to listen on for incoming PostgreSQL connections.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Maximum number of concurrent sessions.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Socket read chunk size in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Set TCP_NODELAY on both sides of a session.
    #[serde(default)]
    pub nodelay: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            max_connections: default_max_connections(),
            buffer_size: default_buffer_size(),
            nodelay: false,
        }
    }
}

/// Configuration for the upstream PostgreSQL server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Hostname of the upstream server.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port of the upstream server.
    #[serde(default = "default_upstream_port")]
    pub port: u16,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_upstream_port(),
        }
    }
}

impl UpstreamConfig {
    /// The `host:port` address to connect sessions to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Default value functions
fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    5433
}

fn default_max_connections() -> usize {
    1000
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_upstream_port() -> u16 {
    5432
}
