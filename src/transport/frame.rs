//! Frame and group identity types

use bytes::Bytes;

/// Ordinal of a group within one track.
///
/// Sequences handed out by a track cache are strictly increasing; a group is
/// created exactly once per sequence and never reused.
pub type GroupSequence = u64;

/// An immutable unit of encoded data.
///
/// Ownership passes from the producer to the cache and on to every attached
/// sink; sinks must not mutate the payload. Cloning is cheap because the
/// payload is reference-counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    /// Create a frame from a payload
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Payload length in bytes
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Copy the payload into `buf`, returning the number of bytes copied
    pub fn copy_to(&self, buf: &mut [u8]) -> usize {
        let n = self.data.len().min(buf.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        n
    }

    /// Borrow the payload
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }
}
