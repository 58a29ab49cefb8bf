//! # pgtrace-core
//!
//! Configuration types shared across the pgtrace crates.
//!
//! Configuration is loaded from a single YAML file (pgtrace.yaml) into a
//! [`PgTraceConfig`], which the proxy and capture crates take as fixed
//! input at startup and never mutate.

pub mod config;

pub use config::{
    CaptureConfig,
    ConfigError,
    PgTraceConfig,
    ProxyConfig,
    UpstreamConfig,
};
