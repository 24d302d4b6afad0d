//! Message Buffer
//!
//! Growable inbound byte buffer. Connections append raw socket data;
//! protocol decoders parse the buffered prefix and extract whole messages
//! once they are complete.

use bytes::{Buf, Bytes, BytesMut};

/// Default initial capacity (one typical mbuf)
const DEFAULT_CAPACITY: usize = 16 * 1024;

/// Buffered, not-yet-parsed bytes of one connection
#[derive(Debug)]
pub struct MessageBuffer {
    buf: BytesMut,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Append freshly read bytes
    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Immutable view of everything buffered
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Remove and return the first `len` bytes without copying
    ///
    /// Callers must only extract what they have already seen buffered.
    pub fn extract(&mut self, len: usize) -> Bytes {
        let len = len.min(self.buf.len());
        self.buf.split_to(len).freeze()
    }

    /// Drop the first `len` bytes
    pub fn consume(&mut self, len: usize) {
        let len = len.min(self.buf.len());
        self.buf.advance(len);
    }

    /// Discard everything (connection reset)
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}
