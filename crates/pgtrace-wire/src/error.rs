//! Error types for the decoding engine.

use thiserror::Error;

use crate::exchange::ExchangeError;

/// Errors produced while decoding a byte stream.
///
/// `Truncated` is a flow-control signal, not a failure: the current frame
/// is incomplete and the caller should wait for more bytes. `Malformed`
/// disables decoding for the affected direction only; the remaining
/// variants end the session.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not enough bytes for the read at hand.
    #[error("need more bytes to complete the current frame")]
    Truncated,

    /// Declared frame structure is inconsistent with the bytes present.
    #[error("malformed frame (tag {tag}): {reason}")]
    Malformed { tag: u8, reason: String },

    /// The startup frame carried a request code this proxy does not know.
    #[error("unknown startup request code {0}")]
    UnknownStartupCode(i32),

    /// A protocol version 1/2 startup was refused.
    #[error("legacy protocol version refused (request code {0})")]
    LegacyProtocol(i32),

    /// Read or write failure at the resumption/reply exchange.
    #[error(transparent)]
    Transport(#[from] ExchangeError),
}

impl DecodeError {
    pub(crate) fn malformed(tag: u8, reason: impl Into<String>) -> Self {
        Self::Malformed {
            tag,
            reason: reason.into(),
        }
    }
}
