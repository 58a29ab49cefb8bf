//! Chunk-level socket transport.
//!
//! A pure byte mover with no knowledge of message structure: one read call
//! per chunk, classified as data or peer-closed, and writes that always
//! either transmit everything or fail.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// One socket read's worth of bytes.
#[derive(Debug, Clone)]
pub struct Message {
    /// First byte of the chunk. Only meaningful relative to a known frame
    /// boundary; the decoder establishes that, not the transport.
    pub kind: u8,
    /// The chunk itself.
    pub data: Bytes,
}

impl Message {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Reads and writes chunks with a fixed scratch capacity.
#[derive(Debug, Clone)]
pub struct MessageTransport {
    buffer_size: usize,
}

impl MessageTransport {
    pub fn new(buffer_size: usize) -> Self {
        Self { buffer_size }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Perform one read. `Ok(None)` means the peer closed the connection —
    /// the end of the session, not an error. Would-block never surfaces
    /// here: awaiting readiness replaces the retry loop a raw socket
    /// would need.
    pub async fn read_chunk<R>(&self, socket: &mut R) -> std::io::Result<Option<Message>>
    where
        R: AsyncRead + Unpin,
    {
        let mut scratch = BytesMut::with_capacity(self.buffer_size);
        let n = socket.read_buf(&mut scratch).await?;
        if n == 0 {
            return Ok(None);
        }

        let data = scratch.freeze();
        Ok(Some(Message {
            kind: data[0],
            data,
        }))
    }

    /// Write a whole chunk. Partial writes are re-issued until everything
    /// is on the wire; a short transmission never goes unreported.
    pub async fn write_chunk<W>(&self, socket: &mut W, data: &[u8]) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        socket.write_all(data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_classifies_data_and_close() {
        let (mut near, mut far) = tokio::io::duplex(1024);
        let transport = MessageTransport::new(1024);

        near.write_all(b"Q1234").await.unwrap();
        let msg = transport.read_chunk(&mut far).await.unwrap().unwrap();
        assert_eq!(msg.kind, b'Q');
        assert_eq!(&msg.data[..], b"Q1234");

        drop(near);
        assert!(transport.read_chunk(&mut far).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_caps_at_buffer_size() {
        let (mut near, mut far) = tokio::io::duplex(1024);
        let transport = MessageTransport::new(4);

        near.write_all(b"abcdefgh").await.unwrap();
        let first = transport.read_chunk(&mut far).await.unwrap().unwrap();
        assert_eq!(&first.data[..], b"abcd");
        let second = transport.read_chunk(&mut far).await.unwrap().unwrap();
        assert_eq!(&second.data[..], b"efgh");
    }

    #[tokio::test]
    async fn test_write_transmits_everything() {
        let (mut near, mut far) = tokio::io::duplex(1024);
        let transport = MessageTransport::new(1024);

        let payload: Vec<u8> = (0..=255u8).collect();
        transport.write_chunk(&mut near, &payload).await.unwrap();
        drop(near);

        let mut received = Vec::new();
        far.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, payload);
    }
}
