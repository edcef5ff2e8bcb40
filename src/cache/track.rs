//! Track cache: rollover orchestration and per-consumer delivery
//!
//! The track cache owns the current group, decides when an incoming chunk
//! rolls over to a new group, and hands every group to each attached
//! consumer. One delivery task runs per consumer and processes groups
//! strictly in order: the next group is not opened until the previous one
//! reached a terminal outcome for that consumer, so a slow consumer can
//! never interleave frames from two groups.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use super::chunk::EncodedChunk;
use super::config::TrackCacheConfig;
use super::error::CacheError;
use super::group::GroupCache;
use crate::transport::{
    Context, ErrorCode, GroupSequence, TrackSink, INTERNAL_SUBSCRIBE_ERROR_CODE,
    PUBLISH_ABORTED_ERROR_CODE,
};

enum ConsumerEvent {
    Group(Arc<GroupCache>),
    Abort { code: ErrorCode, reason: String },
}

struct ConsumerHandle {
    events: mpsc::UnboundedSender<ConsumerEvent>,
}

struct Inner {
    current: Arc<GroupCache>,
    consumers: Vec<ConsumerHandle>,
    closed: bool,
}

/// Buffers and fans out the group sequence of one track
pub struct TrackCache {
    config: TrackCacheConfig,
    inner: Mutex<Inner>,
}

impl TrackCache {
    /// Create a track cache with an open initial group
    pub fn new(config: TrackCacheConfig) -> Self {
        let current = Arc::new(GroupCache::new(config.start_sequence, 0));
        Self {
            config,
            inner: Mutex::new(Inner {
                current,
                consumers: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Sequence of the group currently accepting appends
    pub fn current_sequence(&self) -> GroupSequence {
        self.lock().current.sequence()
    }

    /// Number of attached consumers
    pub fn consumer_count(&self) -> usize {
        self.lock().consumers.len()
    }

    /// Whether the track was closed
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Route one encoded chunk into the track
    ///
    /// A key chunk whose timestamp exceeds the current group's start by more
    /// than the configured maximum group duration closes the current group
    /// and opens the next one; the chunk then lands in the current group.
    /// No-op after `close`.
    pub fn append(&self, chunk: EncodedChunk) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }

        let max_duration = self.config.max_group_duration.as_micros() as u64;
        let rollover = chunk.is_key()
            && chunk.timestamp > inner.current.timestamp().saturating_add(max_duration);

        if rollover {
            inner.current.close();

            let next = Arc::new(GroupCache::new(
                inner.current.sequence() + 1,
                chunk.timestamp,
            ));
            tracing::debug!(
                sequence = next.sequence(),
                timestamp = chunk.timestamp,
                "group rollover"
            );
            inner.current = Arc::clone(&next);
            inner
                .consumers
                .retain(|consumer| {
                    consumer
                        .events
                        .send(ConsumerEvent::Group(Arc::clone(&next)))
                        .is_ok()
                });
        }

        inner.current.append(chunk.into_frame());
    }

    /// Attach a consumer to the track
    ///
    /// The in-flight current group is offered first, so a late joiner never
    /// misses its backlog. Delivery runs until the track closes or `ctx`
    /// cancels; either way the consumer's sink reaches a terminal call.
    pub fn subscribe(&self, ctx: Context, sink: Box<dyn TrackSink>) -> Result<(), CacheError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(CacheError::TrackClosed);
            }
            // Queue the current group inside the lock so a concurrent
            // rollover cannot reorder it behind its successor.
            let _ = events_tx.send(ConsumerEvent::Group(Arc::clone(&inner.current)));
            inner.consumers.push(ConsumerHandle { events: events_tx });

            tracing::info!(
                sequence = inner.current.sequence(),
                consumers = inner.consumers.len(),
                "consumer attached"
            );
        }

        tokio::spawn(deliver(ctx, sink, events_rx));
        Ok(())
    }

    /// End the track gracefully
    ///
    /// The current group closes; consumers drain their outstanding groups
    /// and then have their sinks closed normally. Idempotent.
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.current.close();
        inner.consumers.clear();

        tracing::info!(sequence = inner.current.sequence(), "track cache closed");
    }

    /// Tear the track down after a producer-side failure
    ///
    /// The current group expires and every consumer sink is closed with the
    /// given code and reason. Idempotent with `close`.
    pub fn close_with_error(&self, code: ErrorCode, reason: &str) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.current.expire();
        for consumer in inner.consumers.drain(..) {
            let _ = consumer.events.send(ConsumerEvent::Abort {
                code,
                reason: reason.to_string(),
            });
        }

        tracing::warn!(code, reason, "track cache closed with error");
    }

    /// Close the track automatically when the owning context ends
    pub fn bind_context(self: &Arc<Self>, ctx: Context) {
        let track = Arc::downgrade(self);
        tokio::spawn(async move {
            ctx.done().await;
            if let Some(track) = track.upgrade() {
                let reason = ctx.reason().unwrap_or_else(|| "publish aborted".to_string());
                track.close_with_error(PUBLISH_ABORTED_ERROR_CODE, &reason);
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }
}

/// Per-consumer delivery loop: one group at a time, in order
async fn deliver(
    ctx: Context,
    mut sink: Box<dyn TrackSink>,
    mut events: mpsc::UnboundedReceiver<ConsumerEvent>,
) {
    loop {
        let event = tokio::select! {
            _ = ctx.done() => {
                sink.close().await;
                return;
            }
            event = events.recv() => event,
        };

        match event {
            Some(ConsumerEvent::Group(group)) => {
                let mut group_sink = match sink.open_group(group.sequence()).await {
                    Ok(group_sink) => group_sink,
                    Err(err) => {
                        tracing::warn!(
                            sequence = group.sequence(),
                            error = %err,
                            "failed to open group"
                        );
                        sink.close_with_error(INTERNAL_SUBSCRIBE_ERROR_CODE, &err.to_string())
                            .await;
                        return;
                    }
                };

                let cancelled = tokio::select! {
                    _ = ctx.done() => true,
                    _ = group.flush(group.sequence(), group_sink.as_mut()) => false,
                };
                if cancelled {
                    group_sink
                        .cancel(PUBLISH_ABORTED_ERROR_CODE, "subscription cancelled")
                        .await;
                    sink.close().await;
                    return;
                }
            }
            Some(ConsumerEvent::Abort { code, reason }) => {
                sink.close_with_error(code, &reason).await;
                return;
            }
            None => {
                // Producer closed the track; everything queued was drained.
                sink.close().await;
                return;
            }
        }
    }
}
