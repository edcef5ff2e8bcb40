//! Transport error codes and error type
//!
//! Error codes are opaque integers carried on the wire by the transport
//! layer; only their semantics are stable here.

/// Opaque transport-level error code
pub type ErrorCode = u32;

/// Generic consumer-side failure while serving a track subscription
pub const INTERNAL_SUBSCRIBE_ERROR_CODE: ErrorCode = 0x00;

/// Write failure within a group
pub const INTERNAL_GROUP_ERROR_CODE: ErrorCode = 0x00;

/// The group was superseded by a newer one before delivery finished
pub const EXPIRED_GROUP_ERROR_CODE: ErrorCode = 0x03;

/// The producer shut down while delivery was in flight
pub const PUBLISH_ABORTED_ERROR_CODE: ErrorCode = 0x05;

/// Error type for transport write/read operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// A write to the peer failed
    Write(String),
    /// The underlying stream is gone
    Closed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Write(msg) => write!(f, "write failed: {}", msg),
            TransportError::Closed => write!(f, "stream closed"),
        }
    }
}

impl std::error::Error for TransportError {}
