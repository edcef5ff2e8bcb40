//! Catalog error types

use crate::transport::TransportError;

/// Error type for catalog encode/decode sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The stream's version does not equal the expected version
    VersionMismatch { expected: String, got: String },
    /// A record violated the snapshot-then-patch protocol
    ProtocolViolation(String),
    /// A record could not be encoded
    Encode(String),
    /// The transport failed underneath the session
    Transport(TransportError),
    /// The scoping context was cancelled
    Cancelled(Option<String>),
    /// The session ended before the waited-for event
    Closed,
}

impl CatalogError {
    /// Whether this result is a cancellation rather than a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, CatalogError::Cancelled(_))
    }
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::VersionMismatch { expected, got } => {
                write!(
                    f,
                    "catalog version mismatch: expected {}, got {}",
                    expected, got
                )
            }
            CatalogError::ProtocolViolation(msg) => {
                write!(f, "catalog protocol violation: {}", msg)
            }
            CatalogError::Encode(msg) => write!(f, "failed to encode catalog record: {}", msg),
            CatalogError::Transport(err) => write!(f, "catalog transport error: {}", err),
            CatalogError::Cancelled(Some(reason)) => write!(f, "cancelled: {}", reason),
            CatalogError::Cancelled(None) => write!(f, "cancelled"),
            CatalogError::Closed => write!(f, "catalog session closed"),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<TransportError> for CatalogError {
    fn from(err: TransportError) -> Self {
        CatalogError::Transport(err)
    }
}
