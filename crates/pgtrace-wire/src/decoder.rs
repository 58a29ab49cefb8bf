//! The per-connection protocol decoder.
//!
//! One instance per session, owning the transport-state gate and the two
//! per-direction accumulation buffers. The session calls
//! [`ProtocolDecoder::on_client_data`] / [`on_server_data`] once per chunk
//! read; the decoder walks complete frames off the front of the buffer,
//! emits one capture event per frame, and leaves partial frames buffered
//! for the next pass. Forwarding of the raw bytes is the session's job and
//! never depends on decode success.

use std::sync::Arc;

use crate::backend;
use crate::buffer::AccumBuffer;
use crate::codec::ByteReader;
use crate::error::DecodeError;
use crate::event::{Direction, EventSink, SessionStatus, Tag, TAG_OPAQUE, WireEvent};
use crate::exchange::{Exchange, ExchangeError};
use crate::frontend;

/// Largest declared frame length this decoder will buffer; the protocol
/// caps messages at 1 GiB.
const MAX_FRAME_LEN: usize = 1 << 30;

/// Whether the byte stream is still parseable plaintext or has been handed
/// to an encrypted/negotiated channel. Transitions forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Plain,
    Ssl,
    Gss,
}

/// Socket identifiers included in capture events.
#[derive(Debug, Clone, Copy)]
pub struct Endpoints {
    pub client: i32,
    pub server: i32,
}

/// Result of the whole-frame guard.
enum FrameGuard {
    /// Tag and total frame size (tag byte + declared length).
    Ready(u8, usize),
    /// Wait for more bytes.
    NeedMore,
}

/// Streaming protocol decoder for one session.
pub struct ProtocolDecoder {
    sink: Arc<dyn EventSink>,
    endpoints: Endpoints,
    transport: TransportState,
    client_buf: AccumBuffer,
    server_buf: AccumBuffer,
    /// Set when a malformed frame poisoned the direction; its traffic is
    /// still forwarded but logged opaquely for the rest of the session.
    client_disabled: bool,
    server_disabled: bool,
}

impl ProtocolDecoder {
    pub fn new(sink: Arc<dyn EventSink>, endpoints: Endpoints) -> Self {
        Self {
            sink,
            endpoints,
            transport: TransportState::Plain,
            client_buf: AccumBuffer::new(),
            server_buf: AccumBuffer::new(),
            client_disabled: false,
            server_disabled: false,
        }
    }

    /// Current transport state of the session.
    pub fn transport(&self) -> TransportState {
        self.transport
    }

    fn emit(&self, direction: Direction, tag: Tag, detail: Option<String>) {
        let (from, to) = match direction {
            Direction::Client => (self.endpoints.client, self.endpoints.server),
            Direction::Server => (self.endpoints.server, self.endpoints.client),
        };
        self.sink.emit(WireEvent {
            direction,
            from,
            to,
            tag,
            detail,
        });
    }

    /// The tagged-frame guard: a frame is processable only when the tag,
    /// the length word and the full declared body are buffered.
    fn frame_guard(buf: &[u8]) -> Result<FrameGuard, DecodeError> {
        if buf.len() < 5 {
            return Ok(FrameGuard::NeedMore);
        }
        let tag = buf[0];
        let declared = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        if declared < 4 || declared as usize > MAX_FRAME_LEN {
            return Err(DecodeError::malformed(
                tag,
                format!("implausible declared length {declared}"),
            ));
        }
        let total = declared as usize + 1;
        if buf.len() < total {
            return Ok(FrameGuard::NeedMore);
        }
        Ok(FrameGuard::Ready(tag, total))
    }

    fn unsupported(&mut self, direction: Direction, tag: u8) {
        tracing::info!(tag = %Tag(tag), direction = %direction, "unsupported tag");
        self.emit(direction, Tag(tag), Some("unsupported".to_string()));
        // Frame boundaries can no longer be trusted; discard what is
        // buffered so the loop cannot spin on garbage.
        match direction {
            Direction::Client => self.client_buf.clear(),
            Direction::Server => self.server_buf.clear(),
        }
    }

    fn abort_direction(&mut self, direction: Direction, tag: u8, error: &DecodeError) {
        tracing::warn!(
            tag = %Tag(tag),
            direction = %direction,
            error = %error,
            "malformed frame; decoding disabled for this direction"
        );
        self.emit(direction, Tag(tag), Some("malformed".to_string()));
        match direction {
            Direction::Client => {
                self.client_disabled = true;
                self.client_buf.clear();
            }
            Direction::Server => {
                self.server_disabled = true;
                self.server_buf.clear();
            }
        }
    }

    /// Decode one client chunk. The chunk's bytes are appended to the
    /// client accumulation buffer and every complete frame at the front is
    /// parsed and emitted.
    pub async fn on_client_data<X: Exchange>(
        &mut self,
        data: &[u8],
        exchange: &mut X,
    ) -> Result<SessionStatus, DecodeError> {
        self.client_buf.append(data);

        if self.transport != TransportState::Plain || self.client_disabled {
            self.emit(Direction::Client, Tag(TAG_OPAQUE), None);
            self.client_buf.clear();
            return Ok(SessionStatus::Continue);
        }

        let mut status = SessionStatus::Continue;

        loop {
            if self.client_buf.is_empty() {
                break;
            }
            let tag = self.client_buf.as_slice()[0];

            if tag == 0 {
                match self.decode_startup(exchange).await {
                    Ok(false) => break,
                    Ok(true) => {
                        if self.transport != TransportState::Plain {
                            // The channel just went opaque; anything else
                            // already buffered cannot be parsed.
                            if !self.client_buf.is_empty() {
                                self.emit(Direction::Client, Tag(TAG_OPAQUE), None);
                                self.client_buf.clear();
                            }
                            break;
                        }
                        continue;
                    }
                    Err(e @ DecodeError::Malformed { .. }) => {
                        self.abort_direction(Direction::Client, 0, &e);
                        break;
                    }
                    Err(other) => return Err(other),
                }
            }

            if !frontend::TAGS.contains(&tag) {
                self.unsupported(Direction::Client, tag);
                break;
            }

            let (tag, total) = match Self::frame_guard(self.client_buf.as_slice()) {
                Ok(FrameGuard::Ready(tag, total)) => (tag, total),
                Ok(FrameGuard::NeedMore) => break,
                Err(e) => {
                    self.abort_direction(Direction::Client, tag, &e);
                    break;
                }
            };

            let parsed = frontend::parse(tag, &self.client_buf.as_slice()[5..total]);
            match parsed {
                Ok(detail) => {
                    if tag == b'X' {
                        status = status.escalate(SessionStatus::SessionEnded);
                    }
                    self.emit(Direction::Client, Tag(tag), detail);
                    self.client_buf.remove(total);
                }
                Err(e) => {
                    self.abort_direction(Direction::Client, tag, &e);
                    break;
                }
            }
        }

        Ok(status)
    }

    /// Decode one server chunk, same discipline as the client side plus
    /// the DataRow streaming path.
    pub async fn on_server_data<X: Exchange>(
        &mut self,
        data: &[u8],
        exchange: &mut X,
    ) -> Result<SessionStatus, DecodeError> {
        self.server_buf.append(data);

        if self.transport != TransportState::Plain {
            // Only the single-byte SSL/GSS refusals are still recognizable
            // once the channel is opaque; length words cannot be trusted.
            let tag = self.server_buf.as_slice().first().copied().unwrap_or(0);
            if tag == b'N' {
                self.emit(Direction::Server, Tag(b'N'), None);
            } else {
                self.emit(Direction::Server, Tag(TAG_OPAQUE), None);
            }
            self.server_buf.clear();
            return Ok(SessionStatus::Continue);
        }

        if self.server_disabled {
            self.emit(Direction::Server, Tag(TAG_OPAQUE), None);
            self.server_buf.clear();
            return Ok(SessionStatus::Continue);
        }

        let mut status = SessionStatus::Continue;

        loop {
            if self.server_buf.is_empty() {
                break;
            }
            let tag = self.server_buf.as_slice()[0];

            if !backend::TAGS.contains(&tag) {
                self.unsupported(Direction::Server, tag);
                break;
            }

            if tag == b'D' {
                match self.decode_data_row(exchange).await {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(e @ DecodeError::Malformed { .. }) => {
                        self.abort_direction(Direction::Server, b'D', &e);
                        break;
                    }
                    Err(other) => return Err(other),
                }
            }

            let (tag, total) = match Self::frame_guard(self.server_buf.as_slice()) {
                Ok(FrameGuard::Ready(tag, total)) => (tag, total),
                Ok(FrameGuard::NeedMore) => break,
                Err(e) => {
                    self.abort_direction(Direction::Server, tag, &e);
                    break;
                }
            };

            let parsed = backend::parse(tag, &self.server_buf.as_slice()[5..total]);
            match parsed {
                Ok(frame) => {
                    if frame.fatal {
                        status = status.escalate(SessionStatus::ServerFatal);
                    }
                    self.emit(Direction::Server, Tag(tag), frame.detail);
                    self.server_buf.remove(total);
                }
                Err(e) => {
                    self.abort_direction(Direction::Server, tag, &e);
                    break;
                }
            }
        }

        Ok(status)
    }

    /// Handle the untagged startup/negotiation frame.
    ///
    /// Returns `Ok(false)` when the frame is not fully buffered yet and
    /// `Ok(true)` once it has been consumed. Legacy and unknown request
    /// codes surface as errors the session maps to termination.
    async fn decode_startup<X: Exchange>(
        &mut self,
        exchange: &mut X,
    ) -> Result<bool, DecodeError> {
        let (length, request) = {
            let buf = self.client_buf.as_slice();
            if buf.len() < 8 {
                return Ok(false);
            }
            let mut r = ByteReader::new(buf);
            (r.read_i32()?, r.read_i32()?)
        };

        if length < 8 || length as usize > MAX_FRAME_LEN {
            return Err(DecodeError::malformed(
                0,
                format!("implausible startup length {length}"),
            ));
        }
        let total = length as usize;
        if self.client_buf.len() < total {
            return Ok(false);
        }

        match request {
            frontend::REQUEST_V3 => {
                let detail = {
                    let frame = &self.client_buf.as_slice()[..total];
                    let mut r = ByteReader::new(frame);
                    r.skip(8)?;
                    // The parameter region is consecutive null-terminated
                    // strings, implicitly paired, closed by one extra
                    // terminator; each raw string is logged as-is.
                    let mut parts = vec!["version=3.0".to_string()];
                    while r.remaining() > 1 {
                        parts.push(r.read_cstr().map_err(|_| {
                            DecodeError::malformed(0, "unterminated startup parameter")
                        })?);
                    }
                    parts.join(" ")
                };
                self.emit(Direction::Client, Tag(0), Some(detail));
                self.client_buf.remove(total);
            }
            frontend::REQUEST_CANCEL => {
                if total < 16 {
                    return Err(DecodeError::malformed(0, "short cancel request"));
                }
                let buf = self.client_buf.as_slice();
                let pid = i32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
                let secret = i32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);
                self.emit(
                    Direction::Client,
                    Tag(0),
                    Some(format!("cancel pid={pid} secret={secret}")),
                );
                self.client_buf.remove(total);
            }
            frontend::REQUEST_SSL => {
                self.transport = TransportState::Ssl;
                self.emit(Direction::Client, Tag(0), Some("SSLRequest".to_string()));
                self.client_buf.remove(total);
            }
            frontend::REQUEST_GSS => {
                self.transport = TransportState::Gss;
                self.emit(Direction::Client, Tag(0), Some("GSSRequest".to_string()));
                self.client_buf.remove(total);
            }
            frontend::REQUEST_V2 => {
                exchange.reply(&frontend::legacy_refusal()).await?;
                exchange.reply(&frontend::empty_terminator()).await?;
                self.emit(
                    Direction::Client,
                    Tag(0),
                    Some("protocol=2 refused".to_string()),
                );
                return Err(DecodeError::LegacyProtocol(request));
            }
            other => return Err(DecodeError::UnknownStartupCode(other)),
        }

        Ok(true)
    }

    /// The one resumable message. Parses the column count, then walks the
    /// columns byte by byte; when the buffered bytes run out mid-row the
    /// walk refills through the exchange (flush downstream, one blocking
    /// read upstream) and resumes where it stopped. Column values stay
    /// byte-for-byte intact across the splice and nothing is re-logged.
    ///
    /// Returns `Ok(false)` if even the row header is not buffered yet.
    async fn decode_data_row<X: Exchange>(
        &mut self,
        exchange: &mut X,
    ) -> Result<bool, DecodeError> {
        let (declared, columns) = {
            let buf = self.server_buf.as_slice();
            if buf.len() < 7 {
                return Ok(false);
            }
            let declared = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
            let columns = i16::from_be_bytes([buf[5], buf[6]]);
            (declared, columns)
        };

        if declared < 6 || declared as usize > MAX_FRAME_LEN {
            return Err(DecodeError::malformed(
                b'D',
                format!("implausible declared length {declared}"),
            ));
        }
        if columns < 0 {
            return Err(DecodeError::malformed(
                b'D',
                format!("negative column count {columns}"),
            ));
        }

        self.server_buf.remove(7);
        let mut body_remaining = declared as usize - 6;
        let mut parts = vec![format!("columns={columns}")];

        for _ in 0..columns {
            let len_bytes = self.take_streamed(4, &mut body_remaining, exchange).await?;
            let len = i32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);

            if len == -1 {
                parts.push("null".to_string());
                continue;
            }
            if len < 0 {
                return Err(DecodeError::malformed(
                    b'D',
                    format!("negative column length {len}"),
                ));
            }

            let value = self
                .take_streamed(len as usize, &mut body_remaining, exchange)
                .await?;
            parts.push(format!("\"{}\"", String::from_utf8_lossy(&value)));
        }

        // A row whose columns do not cover the declared length still has
        // to be consumed to keep the frame boundary.
        if body_remaining > 0 {
            let skip = body_remaining;
            self.discard_streamed(skip, &mut body_remaining, exchange)
                .await?;
        }

        self.emit(Direction::Server, Tag(b'D'), Some(parts.join(" ")));
        Ok(true)
    }

    /// Consume exactly `n` row-body bytes from the server buffer, pulling
    /// fresh chunks through the exchange whenever it runs dry.
    async fn take_streamed<X: Exchange>(
        &mut self,
        n: usize,
        body_remaining: &mut usize,
        exchange: &mut X,
    ) -> Result<Vec<u8>, DecodeError> {
        if n > *body_remaining {
            return Err(DecodeError::malformed(
                b'D',
                "column data exceeds declared row length",
            ));
        }

        let mut out = Vec::with_capacity(n.min(64 * 1024));
        while out.len() < n {
            self.ensure_row_bytes(exchange).await?;
            let available = self.server_buf.len();
            let take = (n - out.len()).min(available);
            out.extend_from_slice(&self.server_buf.as_slice()[..take]);
            self.server_buf.remove(take);
        }
        *body_remaining -= n;
        Ok(out)
    }

    /// Same as [`take_streamed`] without collecting the bytes.
    async fn discard_streamed<X: Exchange>(
        &mut self,
        n: usize,
        body_remaining: &mut usize,
        exchange: &mut X,
    ) -> Result<(), DecodeError> {
        let mut left = n;
        while left > 0 {
            self.ensure_row_bytes(exchange).await?;
            let take = left.min(self.server_buf.len());
            self.server_buf.remove(take);
            left -= take;
        }
        *body_remaining -= n;
        Ok(())
    }

    async fn ensure_row_bytes<X: Exchange>(
        &mut self,
        exchange: &mut X,
    ) -> Result<(), DecodeError> {
        if !self.server_buf.is_empty() {
            return Ok(());
        }
        let chunk = exchange.refill().await?;
        if chunk.is_empty() {
            return Err(ExchangeError::new(
                Direction::Server,
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "server closed mid-row",
                ),
            )
            .into());
        }
        self.server_buf.append(&chunk);
        Ok(())
    }
}
