//! Group cache: the replayable frame log of one group
//!
//! One producer appends frames; any number of consumers flush concurrently,
//! each reading the full history through its own cursor. Consumers that have
//! drained the backlog park on a broadcast epoch and are woken by every
//! append, close or expire.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

use crate::transport::{
    Frame, GroupSequence, GroupSink, EXPIRED_GROUP_ERROR_CODE, INTERNAL_GROUP_ERROR_CODE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupState {
    /// Accepting appends, serving live readers
    Open,
    /// Graceful end; readers finish the replay then close normally
    Closed,
    /// Superseded; readers abandon remaining delivery
    Expired,
}

#[derive(Debug)]
struct Shared {
    frames: Vec<Frame>,
    state: GroupState,
}

/// Buffer and fan-out point for the frames of one group
///
/// Identified by a per-track `sequence` and the media timestamp at which the
/// group started. Created exactly once per sequence, never reused.
#[derive(Debug)]
pub struct GroupCache {
    sequence: GroupSequence,
    timestamp: u64,
    shared: Mutex<Shared>,
    // Bumped on every append/close/expire; wakes all parked flushes.
    epoch: watch::Sender<u64>,
}

impl GroupCache {
    /// Create an open group cache
    pub fn new(sequence: GroupSequence, timestamp: u64) -> Self {
        let (epoch, _) = watch::channel(0);
        Self {
            sequence,
            timestamp,
            shared: Mutex::new(Shared {
                frames: Vec::new(),
                state: GroupState::Open,
            }),
            epoch,
        }
    }

    /// Group sequence within the track
    pub fn sequence(&self) -> GroupSequence {
        self.sequence
    }

    /// Media timestamp at which the group started, in microseconds
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Number of buffered frames
    pub fn frame_count(&self) -> usize {
        self.lock().frames.len()
    }

    /// Whether the group ended gracefully
    pub fn is_closed(&self) -> bool {
        self.lock().state == GroupState::Closed
    }

    /// Whether the group was superseded
    pub fn is_expired(&self) -> bool {
        self.lock().state == GroupState::Expired
    }

    /// Append a frame to the tail of the group
    ///
    /// No-op once the group is closed or expired. Wakes every flush parked
    /// on this group.
    pub fn append(&self, frame: Frame) {
        {
            let mut shared = self.lock();
            if shared.state != GroupState::Open {
                return;
            }
            shared.frames.push(frame);
        }
        tracing::trace!(sequence = self.sequence, "frame appended");
        self.bump();
    }

    /// Replay the group to one sink, then follow the live tail
    ///
    /// `expected` is a last-moment guard: callers compare sequences before
    /// routing a sink here, and a mismatch returns without writing.
    ///
    /// Writes every buffered frame in append order, then waits for more
    /// frames, a close (`sink.close()`) or an expiry
    /// (`sink.cancel(EXPIRED_GROUP_ERROR_CODE, ..)`). A failed frame write
    /// cancels the sink with `INTERNAL_GROUP_ERROR_CODE` and stops; the
    /// failure never affects the producer or sibling sinks.
    pub async fn flush<S>(&self, expected: GroupSequence, sink: &mut S)
    where
        S: GroupSink + ?Sized,
    {
        if expected != self.sequence {
            tracing::warn!(
                sequence = self.sequence,
                expected,
                "flush sequence mismatch"
            );
            return;
        }

        let mut epoch = self.epoch.subscribe();
        let mut written = 0usize;

        loop {
            // Mark the current epoch seen before snapshotting, so an event
            // landing after the snapshot still wakes the wait below.
            let _ = epoch.borrow_and_update();

            let (batch, state) = {
                let shared = self.lock();
                let batch = if written < shared.frames.len() {
                    shared.frames[written..].to_vec()
                } else {
                    Vec::new()
                };
                (batch, shared.state)
            };

            for frame in batch {
                if let Err(err) = sink.write_frame(frame).await {
                    sink.cancel(
                        INTERNAL_GROUP_ERROR_CODE,
                        &format!("failed to write frame: {}", err),
                    )
                    .await;
                    return;
                }
                written += 1;
            }

            match state {
                GroupState::Closed => {
                    sink.close().await;
                    return;
                }
                GroupState::Expired => {
                    sink.cancel(EXPIRED_GROUP_ERROR_CODE, "cache expired").await;
                    return;
                }
                GroupState::Open => {}
            }

            // The sender lives in self, so this resolves only on a real
            // append/close/expire event.
            if epoch.changed().await.is_err() {
                return;
            }
        }
    }

    /// End the group gracefully; idempotent
    ///
    /// Buffered frames stay readable so in-flight flushes finish the replay
    /// before closing their sinks; memory is released when the cache drops.
    pub fn close(&self) {
        {
            let mut shared = self.lock();
            if shared.state != GroupState::Open {
                return;
            }
            shared.state = GroupState::Closed;
        }
        tracing::debug!(sequence = self.sequence, "group closed");
        self.bump();
    }

    /// Mark the group superseded; idempotent
    ///
    /// Clears buffered frames immediately and tells every parked flush to
    /// abandon delivery. Also valid on an already-closed group: that is the
    /// force-abandon path for slow readers after rollover.
    pub fn expire(&self) {
        {
            let mut shared = self.lock();
            if shared.state == GroupState::Expired {
                return;
            }
            shared.state = GroupState::Expired;
            shared.frames = Vec::new();
        }
        tracing::debug!(sequence = self.sequence, "group expired");
        self.bump();
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn bump(&self) {
        self.epoch.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::transport::{ErrorCode, TransportError};

    #[derive(Default)]
    struct SinkState {
        frames: Vec<Frame>,
        closed: u32,
        cancelled: Vec<(ErrorCode, String)>,
        fail_at: Option<usize>,
    }

    struct RecordingSink {
        state: Arc<Mutex<SinkState>>,
    }

    impl RecordingSink {
        fn new() -> (Self, Arc<Mutex<SinkState>>) {
            let state = Arc::new(Mutex::new(SinkState::default()));
            (
                Self {
                    state: Arc::clone(&state),
                },
                state,
            )
        }
    }

    #[async_trait]
    impl GroupSink for RecordingSink {
        async fn write_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_at == Some(state.frames.len()) {
                return Err(TransportError::Write("pipe broken".to_string()));
            }
            state.frames.push(frame);
            Ok(())
        }

        async fn close(&mut self) {
            self.state.lock().unwrap().closed += 1;
        }

        async fn cancel(&mut self, code: ErrorCode, reason: &str) {
            self.state
                .lock()
                .unwrap()
                .cancelled
                .push((code, reason.to_string()));
        }
    }

    fn frame(payload: &'static [u8]) -> Frame {
        Frame::new(Bytes::from_static(payload))
    }

    #[tokio::test]
    async fn test_flush_replays_then_follows_live_tail() {
        let cache = Arc::new(GroupCache::new(1, 0));
        cache.append(frame(b"a"));
        cache.append(frame(b"b"));

        let (mut sink, state) = RecordingSink::new();
        let flusher = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.flush(1, &mut sink).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(state.lock().unwrap().frames.len(), 2);

        cache.append(frame(b"c"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        cache.close();
        flusher.await.unwrap();

        let state = state.lock().unwrap();
        assert_eq!(state.frames, vec![frame(b"a"), frame(b"b"), frame(b"c")]);
        assert_eq!(state.closed, 1);
        assert!(state.cancelled.is_empty());
    }

    #[tokio::test]
    async fn test_flush_after_close_replays_backlog() {
        let cache = GroupCache::new(1, 0);
        cache.append(frame(b"a"));
        cache.append(frame(b"b"));
        cache.close();

        let (mut sink, state) = RecordingSink::new();
        cache.flush(1, &mut sink).await;

        let state = state.lock().unwrap();
        assert_eq!(state.frames, vec![frame(b"a"), frame(b"b")]);
        assert_eq!(state.closed, 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let cache = GroupCache::new(1, 0);
        cache.close();
        cache.close();
        assert!(cache.is_closed());

        let (mut sink, state) = RecordingSink::new();
        cache.flush(1, &mut sink).await;
        assert_eq!(state.lock().unwrap().closed, 1);
    }

    #[tokio::test]
    async fn test_expire_clears_frames_and_cancels_flushes() {
        let cache = Arc::new(GroupCache::new(1, 0));
        cache.append(frame(b"a"));

        let (mut sink, state) = RecordingSink::new();
        let flusher = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.flush(1, &mut sink).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        cache.expire();
        cache.expire();
        flusher.await.unwrap();

        assert_eq!(cache.frame_count(), 0);
        assert!(cache.is_expired());

        let state = state.lock().unwrap();
        assert_eq!(
            state.cancelled,
            vec![(EXPIRED_GROUP_ERROR_CODE, "cache expired".to_string())]
        );
        assert_eq!(state.closed, 0);
    }

    #[tokio::test]
    async fn test_write_failure_cancels_and_stops() {
        let cache = GroupCache::new(1, 0);
        cache.append(frame(b"a"));
        cache.append(frame(b"b"));
        cache.close();

        let (mut sink, state) = RecordingSink::new();
        state.lock().unwrap().fail_at = Some(1);

        cache.flush(1, &mut sink).await;

        let state = state.lock().unwrap();
        assert_eq!(state.frames, vec![frame(b"a")]);
        assert_eq!(state.closed, 0);
        assert_eq!(state.cancelled.len(), 1);
        assert_eq!(state.cancelled[0].0, INTERNAL_GROUP_ERROR_CODE);
        assert_eq!(
            state.cancelled[0].1,
            "failed to write frame: write failed: pipe broken"
        );
    }

    #[tokio::test]
    async fn test_flush_sequence_mismatch_writes_nothing() {
        let cache = GroupCache::new(1, 0);
        cache.append(frame(b"a"));

        let (mut sink, state) = RecordingSink::new();
        cache.flush(2, &mut sink).await;

        let state = state.lock().unwrap();
        assert!(state.frames.is_empty());
        assert_eq!(state.closed, 0);
        assert!(state.cancelled.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_flushes_each_get_full_history() {
        let cache = Arc::new(GroupCache::new(1, 0));
        cache.append(frame(b"a"));

        let (mut sink1, state1) = RecordingSink::new();
        let (mut sink2, state2) = RecordingSink::new();

        let flusher1 = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.flush(1, &mut sink1).await })
        };
        let flusher2 = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.flush(1, &mut sink2).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.append(frame(b"b"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.close();

        flusher1.await.unwrap();
        flusher2.await.unwrap();

        for state in [state1, state2] {
            let state = state.lock().unwrap();
            assert_eq!(state.frames, vec![frame(b"a"), frame(b"b")]);
            assert_eq!(state.closed, 1);
        }
    }

    #[tokio::test]
    async fn test_append_after_close_is_noop() {
        let cache = GroupCache::new(1, 0);
        cache.append(frame(b"a"));
        cache.close();
        cache.append(frame(b"b"));

        assert_eq!(cache.frame_count(), 1);
    }

    #[tokio::test]
    async fn test_expire_after_close_aborts_remaining_delivery() {
        let cache = Arc::new(GroupCache::new(1, 0));
        cache.append(frame(b"a"));
        cache.close();
        cache.expire();

        assert!(cache.is_expired());
        assert_eq!(cache.frame_count(), 0);

        let (mut sink, state) = RecordingSink::new();
        cache.flush(1, &mut sink).await;

        let state = state.lock().unwrap();
        assert_eq!(state.closed, 0);
        assert_eq!(state.cancelled.len(), 1);
        assert_eq!(state.cancelled[0].0, EXPIRED_GROUP_ERROR_CODE);
    }
}
