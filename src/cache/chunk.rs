//! Encoded chunk input type

use bytes::Bytes;

use crate::transport::Frame;

/// Whether a chunk can bootstrap a decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Decodable on its own; may start a new group
    Key,
    /// Depends on preceding chunks of the same group
    Delta,
}

/// One unit of output from an encode engine
///
/// The payload is expected to have passed through the caller's framing layer
/// already; the cache treats it as opaque bytes.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// Key or delta
    pub kind: ChunkKind,
    /// Media timestamp in microseconds
    pub timestamp: u64,
    /// Framed payload
    pub data: Bytes,
}

impl EncodedChunk {
    /// Create a key chunk
    pub fn key(timestamp: u64, data: impl Into<Bytes>) -> Self {
        Self {
            kind: ChunkKind::Key,
            timestamp,
            data: data.into(),
        }
    }

    /// Create a delta chunk
    pub fn delta(timestamp: u64, data: impl Into<Bytes>) -> Self {
        Self {
            kind: ChunkKind::Delta,
            timestamp,
            data: data.into(),
        }
    }

    /// Whether this chunk can start a new group
    pub fn is_key(&self) -> bool {
        self.kind == ChunkKind::Key
    }

    /// Consume the chunk into a cacheable frame
    pub fn into_frame(self) -> Frame {
        Frame::new(self.data)
    }
}
