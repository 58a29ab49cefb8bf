//! The accept loop.
//!
//! Binds the listen address, accepts client connections, connects each one
//! to the upstream server and spawns a [`Session`] task. All sessions
//! share one capture sink; everything else is per-session.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use std::os::unix::io::AsRawFd;
use tokio::net::{TcpListener, TcpStream};

use pgtrace_capture::CaptureSink;
use pgtrace_core::PgTraceConfig;
use pgtrace_wire::{Endpoints, ProtocolDecoder};

use crate::dump::TrafficDump;
use crate::error::ProxyError;
use crate::session::{Session, SessionOutcome};
use crate::transport::MessageTransport;

/// The pgtrace proxy server.
pub struct TraceProxy {
    config: PgTraceConfig,
    sink: Arc<CaptureSink>,
    active: Arc<AtomicUsize>,
    next_session_id: AtomicU64,
}

impl TraceProxy {
    /// Create a proxy with the given configuration, opening the capture
    /// file immediately.
    pub fn new(config: PgTraceConfig) -> Result<Self, ProxyError> {
        let sink = Arc::new(CaptureSink::new(&config.capture)?);
        Ok(Self {
            config,
            sink,
            active: Arc::new(AtomicUsize::new(0)),
            next_session_id: AtomicU64::new(1),
        })
    }

    /// Get a reference to the proxy configuration.
    pub fn config(&self) -> &PgTraceConfig {
        &self.config
    }

    /// Number of sessions currently being relayed.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Run the accept loop.
    pub async fn run(&self) -> Result<(), ProxyError> {
        let listen_addr = format!(
            "{}:{}",
            self.config.proxy.listen_addr, self.config.proxy.listen_port
        );

        tracing::info!(
            listen_addr = %listen_addr,
            upstream = %self.config.upstream.address(),
            "starting pgtrace proxy"
        );

        let listener = TcpListener::bind(&listen_addr).await.map_err(|e| {
            ProxyError::BindFailed {
                address: listen_addr.clone(),
                source: e,
            }
        })?;

        tracing::info!(address = %listen_addr, "proxy listening");

        loop {
            let (client, peer_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            if self.active.load(Ordering::Relaxed) >= self.config.proxy.max_connections {
                tracing::warn!(peer = %peer_addr, "connection limit reached; dropping connection");
                continue;
            }

            let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(peer = %peer_addr, session_id, "new connection");

            let config = self.config.clone();
            let sink = self.sink.clone();
            let active = self.active.clone();
            active.fetch_add(1, Ordering::Relaxed);

            tokio::spawn(async move {
                match serve(config, sink, session_id, client).await {
                    Ok(outcome) => {
                        tracing::info!(session_id, outcome = %outcome, "session closed");
                    }
                    Err(e) => {
                        tracing::error!(session_id, error = %e, "session setup failed");
                    }
                }
                active.fetch_sub(1, Ordering::Relaxed);
            });
        }
    }
}

/// Connect upstream and relay one client connection to completion.
async fn serve(
    config: PgTraceConfig,
    sink: Arc<CaptureSink>,
    session_id: u64,
    client: TcpStream,
) -> Result<SessionOutcome, ProxyError> {
    let upstream_addr = config.upstream.address();
    let server = TcpStream::connect(&upstream_addr).await.map_err(|e| {
        ProxyError::UpstreamConnectionFailed {
            address: upstream_addr,
            source: e,
        }
    })?;

    if config.proxy.nodelay {
        let _ = client.set_nodelay(true);
        let _ = server.set_nodelay(true);
    }

    let endpoints = Endpoints {
        client: client.as_raw_fd(),
        server: server.as_raw_fd(),
    };

    let dump = if config.capture.save_traffic {
        match TrafficDump::new(&config.capture.traffic_dir, session_id) {
            Ok(dump) => Some(dump),
            Err(e) => {
                tracing::warn!(session_id, error = %e, "failed to open traffic dump");
                None
            }
        }
    } else {
        None
    };

    let decoder = ProtocolDecoder::new(sink, endpoints);
    let transport = MessageTransport::new(config.proxy.buffer_size);

    Ok(Session::new(session_id, client, server, transport, decoder, dump)
        .run()
        .await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgtrace_core::config::{CaptureConfig, ProxyConfig, UpstreamConfig};

    #[test]
    fn test_proxy_creation() {
        let dir = tempfile::tempdir().unwrap();
        let config = PgTraceConfig {
            proxy: ProxyConfig {
                listen_addr: "127.0.0.1".to_string(),
                listen_port: 15433,
                max_connections: 10,
                buffer_size: 8192,
                nodelay: true,
            },
            upstream: UpstreamConfig {
                host: "localhost".to_string(),
                port: 5432,
            },
            capture: CaptureConfig {
                output: dir.path().join("capture.out"),
                ..Default::default()
            },
        };

        let proxy = TraceProxy::new(config).unwrap();
        assert_eq!(proxy.config().proxy.listen_port, 15433);
        assert_eq!(proxy.active_sessions(), 0);
    }
}
