//! The decoder's single window onto live I/O.
//!
//! The engine never touches sockets. The two operations it may need during
//! a decode pass are expressed as this trait, implemented by the session
//! over its socket halves and by in-memory mocks in tests.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::event::Direction;

/// A transport failure at the exchange, annotated with the peer whose
/// socket failed so the session can pick a client- or server-failure
/// outcome.
#[derive(Debug, Error)]
#[error("transport failure on the {} side: {}", .peer.name(), .source)]
pub struct ExchangeError {
    pub peer: Direction,
    #[source]
    pub source: std::io::Error,
}

impl ExchangeError {
    pub fn new(peer: Direction, source: std::io::Error) -> Self {
        Self { peer, source }
    }
}

/// I/O operations reachable from inside a decode pass.
#[async_trait]
pub trait Exchange: Send {
    /// Flush the chunk currently pending forwarding to the destination
    /// peer, then perform one blocking read from the source peer. The
    /// returned chunk becomes the new pending chunk.
    ///
    /// This is the only re-entrant I/O point in the engine; it is invoked
    /// solely by the DataRow column walk when the accumulated bytes run
    /// out mid-row. An empty return means the source peer closed mid-frame.
    async fn refill(&mut self) -> Result<Bytes, ExchangeError>;

    /// Write a synthetic message back to the source peer. Used only to
    /// refuse legacy-protocol startups.
    async fn reply(&mut self, data: &[u8]) -> Result<(), ExchangeError>;
}
