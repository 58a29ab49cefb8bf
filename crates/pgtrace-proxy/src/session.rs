//! One relayed connection.
//!
//! A session owns a client socket, an upstream server socket and a
//! protocol decoder. It waits for whichever side has bytes, hands the
//! chunk to the decoder for capture, and forwards it to the other side.
//! Decode problems degrade the capture only — every chunk that was read
//! is relayed exactly once, in order, whatever the decoder thought of it.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{self, AsyncRead, AsyncWrite};

use pgtrace_wire::{
    DecodeError, Direction, Exchange, ExchangeError, ProtocolDecoder, SessionStatus,
};

use crate::dump::TrafficDump;
use crate::transport::MessageTransport;

/// How a session ended. These are the worker exit statuses of the
/// process-per-connection model, kept as a logged value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The client sent a clean Terminate.
    Terminated,
    /// The client closed its connection.
    ClientDone,
    /// The server closed its connection.
    ServerDone,
    /// The client side failed (transport error, refused startup, protocol
    /// violation).
    ClientFailure,
    /// The server side failed.
    ServerFailure,
    /// The server reported a FATAL/PANIC error.
    ServerFatal,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terminated => "terminated",
            Self::ClientDone => "client-done",
            Self::ServerDone => "server-done",
            Self::ClientFailure => "client-failure",
            Self::ServerFailure => "server-failure",
            Self::ServerFatal => "server-fatal",
        }
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn opposite(direction: Direction) -> Direction {
    match direction {
        Direction::Client => Direction::Server,
        Direction::Server => Direction::Client,
    }
}

fn peer_failure(peer: Direction) -> SessionOutcome {
    match peer {
        Direction::Client => SessionOutcome::ClientFailure,
        Direction::Server => SessionOutcome::ServerFailure,
    }
}

/// The decoder's exchange, backed by the session's socket halves.
///
/// `pending` is the chunk whose forwarding is still owed to the
/// destination peer; `refill` flushes it before reading ahead so the
/// DataRow resumption never reorders traffic.
struct SessionExchange<'a, R, D, O> {
    transport: &'a MessageTransport,
    source: &'a mut R,
    dest: &'a mut D,
    origin: &'a mut O,
    source_peer: Direction,
    pending: Option<Bytes>,
    dump: Option<&'a mut TrafficDump>,
}

impl<R, D, O> SessionExchange<'_, R, D, O>
where
    R: AsyncRead + Unpin + Send,
    D: AsyncWrite + Unpin + Send,
    O: AsyncWrite + Unpin + Send,
{
    async fn flush(&mut self) -> Result<(), ExchangeError> {
        if let Some(chunk) = self.pending.take() {
            self.transport
                .write_chunk(self.dest, &chunk)
                .await
                .map_err(|e| ExchangeError::new(opposite(self.source_peer), e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl<R, D, O> Exchange for SessionExchange<'_, R, D, O>
where
    R: AsyncRead + Unpin + Send,
    D: AsyncWrite + Unpin + Send,
    O: AsyncWrite + Unpin + Send,
{
    async fn refill(&mut self) -> Result<Bytes, ExchangeError> {
        self.flush().await?;

        let chunk = match self
            .transport
            .read_chunk(self.source)
            .await
            .map_err(|e| ExchangeError::new(self.source_peer, e))?
        {
            Some(msg) => msg.data,
            None => Bytes::new(),
        };

        if !chunk.is_empty() {
            if let Some(dump) = self.dump.as_deref_mut() {
                dump.record(self.source_peer, &chunk);
            }
            self.pending = Some(chunk.clone());
        }

        Ok(chunk)
    }

    async fn reply(&mut self, data: &[u8]) -> Result<(), ExchangeError> {
        self.transport
            .write_chunk(self.origin, data)
            .await
            .map_err(|e| ExchangeError::new(self.source_peer, e))
    }
}

/// A single relayed connection.
pub struct Session<C, S> {
    id: u64,
    client: C,
    server: S,
    transport: MessageTransport,
    decoder: ProtocolDecoder,
    dump: Option<TrafficDump>,
}

impl<C, S> Session<C, S>
where
    C: AsyncRead + AsyncWrite + Unpin + Send,
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        id: u64,
        client: C,
        server: S,
        transport: MessageTransport,
        decoder: ProtocolDecoder,
        dump: Option<TrafficDump>,
    ) -> Self {
        Self {
            id,
            client,
            server,
            transport,
            decoder,
            dump,
        }
    }

    /// Relay until one side ends the session.
    pub async fn run(self) -> SessionOutcome {
        let Session {
            id,
            client,
            server,
            transport,
            mut decoder,
            mut dump,
        } = self;

        let (mut client_rx, mut client_tx) = io::split(client);
        let (mut server_rx, mut server_tx) = io::split(server);

        loop {
            tokio::select! {
                read = transport.read_chunk(&mut client_rx) => match read {
                    Ok(Some(msg)) => {
                        if let Some(d) = dump.as_mut() {
                            d.record(Direction::Client, &msg.data);
                        }
                        let done = relay(
                            &mut decoder,
                            &transport,
                            Direction::Client,
                            msg.data,
                            &mut client_rx,
                            &mut server_tx,
                            &mut client_tx,
                            dump.as_mut(),
                        )
                        .await;
                        if let Some(outcome) = done {
                            return outcome;
                        }
                    }
                    Ok(None) => {
                        tracing::debug!(session_id = id, "client done");
                        return SessionOutcome::ClientDone;
                    }
                    Err(e) => {
                        tracing::warn!(session_id = id, error = %e, "client read failed");
                        return SessionOutcome::ClientFailure;
                    }
                },
                read = transport.read_chunk(&mut server_rx) => match read {
                    Ok(Some(msg)) => {
                        if let Some(d) = dump.as_mut() {
                            d.record(Direction::Server, &msg.data);
                        }
                        let done = relay(
                            &mut decoder,
                            &transport,
                            Direction::Server,
                            msg.data,
                            &mut server_rx,
                            &mut client_tx,
                            &mut server_tx,
                            dump.as_mut(),
                        )
                        .await;
                        if let Some(outcome) = done {
                            return outcome;
                        }
                    }
                    Ok(None) => {
                        tracing::debug!(session_id = id, "server done");
                        return SessionOutcome::ServerDone;
                    }
                    Err(e) => {
                        tracing::warn!(session_id = id, error = %e, "server read failed");
                        return SessionOutcome::ServerFailure;
                    }
                },
            }
        }
    }
}

/// Decode one chunk and forward it. Returns the outcome that ends the
/// session, or `None` to keep relaying.
#[allow(clippy::too_many_arguments)]
async fn relay<R, D, O>(
    decoder: &mut ProtocolDecoder,
    transport: &MessageTransport,
    side: Direction,
    chunk: Bytes,
    source: &mut R,
    dest: &mut D,
    origin: &mut O,
    dump: Option<&mut TrafficDump>,
) -> Option<SessionOutcome>
where
    R: AsyncRead + Unpin + Send,
    D: AsyncWrite + Unpin + Send,
    O: AsyncWrite + Unpin + Send,
{
    let mut exchange = SessionExchange {
        transport,
        source,
        dest,
        origin,
        source_peer: side,
        pending: Some(chunk.clone()),
        dump,
    };

    let decoded = match side {
        Direction::Client => decoder.on_client_data(&chunk, &mut exchange).await,
        Direction::Server => decoder.on_server_data(&chunk, &mut exchange).await,
    };

    let status = match decoded {
        Ok(status) => status,
        Err(e) => return Some(failure_outcome(side, e, &mut exchange).await),
    };

    if let Err(e) = exchange.flush().await {
        tracing::warn!(error = %e, "forwarding failed");
        return Some(peer_failure(e.peer));
    }

    match status {
        SessionStatus::Continue => None,
        SessionStatus::SessionEnded => Some(SessionOutcome::Terminated),
        SessionStatus::ServerFatal => Some(SessionOutcome::ServerFatal),
        SessionStatus::ClientFailure => Some(SessionOutcome::ClientFailure),
        SessionStatus::ServerFailure => Some(SessionOutcome::ServerFailure),
    }
}

async fn failure_outcome<R, D, O>(
    side: Direction,
    error: DecodeError,
    exchange: &mut SessionExchange<'_, R, D, O>,
) -> SessionOutcome
where
    R: AsyncRead + Unpin + Send,
    D: AsyncWrite + Unpin + Send,
    O: AsyncWrite + Unpin + Send,
{
    match error {
        // The refusal has already been written to the client; the startup
        // itself is not forwarded upstream.
        DecodeError::LegacyProtocol(code) => {
            tracing::warn!(code, "legacy protocol startup refused");
            SessionOutcome::ClientFailure
        }
        DecodeError::UnknownStartupCode(code) => {
            tracing::error!(code, "unknown startup request code");
            SessionOutcome::ClientFailure
        }
        DecodeError::Transport(e) => {
            tracing::warn!(error = %e, "transport failure during decode");
            peer_failure(e.peer)
        }
        // Malformed/Truncated are absorbed inside the decoder and should
        // not escape; keep the relay honest and fail the source side.
        other => {
            tracing::error!(error = %other, "unexpected decode failure");
            let _ = exchange.flush().await;
            peer_failure(side)
        }
    }
}
