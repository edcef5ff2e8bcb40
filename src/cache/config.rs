//! Track cache configuration

use std::time::Duration;

use crate::transport::GroupSequence;

/// Configuration for a [`TrackCache`](super::TrackCache)
#[derive(Debug, Clone)]
pub struct TrackCacheConfig {
    /// Maximum duration of one group; a key chunk whose timestamp exceeds the
    /// current group's start by more than this rolls over to a new group
    pub max_group_duration: Duration,

    /// Sequence number of the first group
    pub start_sequence: GroupSequence,
}

impl Default for TrackCacheConfig {
    fn default() -> Self {
        Self {
            max_group_duration: Duration::from_secs(2),
            start_sequence: 1,
        }
    }
}

impl TrackCacheConfig {
    /// Set the maximum group duration
    pub fn max_group_duration(mut self, duration: Duration) -> Self {
        self.max_group_duration = duration;
        self
    }

    /// Set the first group sequence
    pub fn start_sequence(mut self, sequence: GroupSequence) -> Self {
        self.start_sequence = sequence;
        self
    }
}
