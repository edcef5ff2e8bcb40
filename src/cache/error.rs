//! Cache error types

/// Error type for cache operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The track cache was closed before the operation
    TrackClosed,
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::TrackClosed => write!(f, "track cache is closed"),
        }
    }
}

impl std::error::Error for CacheError {}
