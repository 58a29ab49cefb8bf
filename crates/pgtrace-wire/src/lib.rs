//! # pgtrace-wire
//!
//! Streaming, resumable decoder for the PostgreSQL v3 wire protocol.
//!
//! The engine operates on a live bidirectional byte stream: messages may
//! span multiple socket reads, one read may contain several messages, and
//! a DataRow may be interrupted mid-column and completed from a fresh read
//! of the peer. Decoding is diagnostic only — the session forwards every
//! byte unmodified regardless of what the decoder makes of it.
//!
//! ## Architecture
//!
//! ```text
//! session chunk ──▶ AccumBuffer ──▶ ProtocolDecoder ──▶ EventSink
//!                    (per direction)   │
//!                                      └─ Exchange (DataRow refill,
//!                                         legacy-startup refusal)
//! ```
//!
//! [`ProtocolDecoder`] owns all per-connection state (transport-state
//! gate, accumulation buffers, per-direction abort flags); there is no
//! process-global decoder state. The only I/O it can reach is the
//! [`Exchange`] it is handed per call.

pub mod backend;
pub mod buffer;
pub mod codec;
pub mod decoder;
pub mod error;
pub mod event;
pub mod exchange;
pub mod frontend;

pub use buffer::AccumBuffer;
pub use codec::{ByteReader, ByteWriter};
pub use decoder::{Endpoints, ProtocolDecoder, TransportState};
pub use error::DecodeError;
pub use event::{Direction, EventSink, SessionStatus, Tag, TAG_OPAQUE, WireEvent};
pub use exchange::{Exchange, ExchangeError};
