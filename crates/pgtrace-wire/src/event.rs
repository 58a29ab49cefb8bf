//! Decoded protocol events and the sink they are delivered to.

use std::fmt;

/// Direction of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to server traffic.
    Client,
    /// Server to client traffic.
    Server,
}

impl Direction {
    /// Human-readable peer name, for log and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => write!(f, "C"),
            Self::Server => write!(f, "S"),
        }
    }
}

/// A message type discriminator.
///
/// Printable ASCII tags render as the character itself; anything else
/// (including the untagged startup frame's 0) renders as a signed integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag(pub u8);

/// The opaque tag used once a session has negotiated an unparseable
/// channel or decoding of a direction has been abandoned.
pub const TAG_OPAQUE: u8 = b'?';

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_ascii_graphic() {
            write!(f, "{}", self.0 as char)
        } else {
            write!(f, "{}", self.0 as i8)
        }
    }
}

/// One decoded (or opaque) frame, ready for the capture file.
#[derive(Debug, Clone)]
pub struct WireEvent {
    /// Which peer sent the frame.
    pub direction: Direction,
    /// Socket identifier of the sending peer.
    pub from: i32,
    /// Socket identifier of the receiving peer.
    pub to: i32,
    /// Frame tag byte.
    pub tag: Tag,
    /// Parser field summary, when the frame was structurally decoded.
    pub detail: Option<String>,
}

/// Destination for decoded events.
///
/// Implemented by the capture sink; tests use in-memory collectors.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: WireEvent);
}

/// Status signal returned to the session after each decode pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Keep relaying.
    Continue,
    /// The client sent a clean Terminate.
    SessionEnded,
    /// The client side failed; shut the session down.
    ClientFailure,
    /// The server side failed; shut the session down.
    ServerFailure,
    /// The server reported a FATAL/PANIC error; shut down with a distinct
    /// status even though the frame itself decoded and was forwarded.
    ServerFatal,
}

impl SessionStatus {
    /// Combine the per-frame signal into the pass-wide one. The first
    /// non-Continue signal of a pass wins.
    pub fn escalate(self, other: SessionStatus) -> SessionStatus {
        match self {
            SessionStatus::Continue => other,
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_rendering() {
        assert_eq!(Tag(b'Q').to_string(), "Q");
        assert_eq!(Tag(b'?').to_string(), "?");
        assert_eq!(Tag(b'1').to_string(), "1");
        assert_eq!(Tag(0).to_string(), "0");
        assert_eq!(Tag(200).to_string(), "-56");
    }

    #[test]
    fn test_direction_rendering() {
        assert_eq!(Direction::Client.to_string(), "C");
        assert_eq!(Direction::Server.to_string(), "S");
    }

    #[test]
    fn test_status_escalation() {
        let s = SessionStatus::Continue.escalate(SessionStatus::ServerFatal);
        assert_eq!(s, SessionStatus::ServerFatal);
        // A fatal signal is not overwritten by a later Continue.
        assert_eq!(s.escalate(SessionStatus::Continue), SessionStatus::ServerFatal);
    }
}
