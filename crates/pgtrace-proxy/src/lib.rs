//! # pgtrace-proxy
//!
//! Transparent relay sessions for pgtrace.
//!
//! This crate supplies everything around the decoding engine: the chunk
//! transport, the per-connection session loop and the accept loop.
//!
//! ## Architecture
//!
//! ```text
//! psql / app
//!     │
//!     │ PostgreSQL wire protocol
//!     ▼
//! ┌──────────────────┐
//! │  pgtrace         │
//! │  1. Read chunk   │  ← transport
//! │  2. Decode       │  ← pgtrace-wire
//! │  3. Capture line │  ← pgtrace-capture
//! │  4. Forward      │
//! └────────┬─────────┘
//!          │
//!          ▼
//!     PostgreSQL
//! ```
//!
//! Bytes are forwarded unmodified in both directions; the decoder only
//! observes. One tokio task per session, one shared capture sink.

pub mod dump;
pub mod error;
pub mod server;
pub mod session;
pub mod transport;

pub use dump::TrafficDump;
pub use error::ProxyError;
pub use server::TraceProxy;
pub use session::{Session, SessionOutcome};
pub use transport::{Message, MessageTransport};
