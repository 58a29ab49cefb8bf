//! Per-direction accumulation buffer.
//!
//! Concatenates newly-read socket data with any unconsumed remainder of
//! the previous decode pass, and releases consumed prefixes. Byte order is
//! preserved; nothing is lost or duplicated. The buffer never aliases the
//! chunk it was fed from (append copies).

use bytes::{Buf, BytesMut};

/// Append/remove byte accumulator.
#[derive(Debug, Default)]
pub struct AccumBuffer {
    bytes: BytesMut,
}

impl AccumBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: BytesMut::with_capacity(capacity),
        }
    }

    /// Append a fresh chunk behind any unconsumed remainder.
    pub fn append(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Drop the first `n` bytes (a fully consumed prefix).
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the buffered length; callers establish the
    /// whole-frame guard before consuming.
    pub fn remove(&mut self, n: usize) {
        assert!(n <= self.bytes.len(), "remove past end of buffer");
        self.bytes.advance(n);
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// View of the buffered bytes, front first.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..]
    }
}
