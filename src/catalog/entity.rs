//! Published-track entity with an observable lifecycle

use tokio::sync::watch;

use super::descriptor::TrackDescriptor;
use crate::transport::Context;

/// One published track: its descriptor plus an active/ended flag
///
/// Created when a producer publishes a track; becomes inactive when the
/// producer removes it, when `end` is called, or when the owning context is
/// cancelled. Never resurrected: a re-publish of the same name is a new
/// entity.
#[derive(Debug)]
pub struct TrackCatalog {
    descriptor: TrackDescriptor,
    ctx: Context,
    // true while active; flips to false exactly once.
    state: watch::Sender<bool>,
}

impl PartialEq for TrackCatalog {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
    }
}

impl TrackCatalog {
    /// Create an active entity owned by `ctx`
    pub fn new(ctx: Context, descriptor: TrackDescriptor) -> Self {
        let (state, _) = watch::channel(true);
        Self {
            descriptor,
            ctx,
            state,
        }
    }

    /// The track's descriptor
    pub fn descriptor(&self) -> &TrackDescriptor {
        &self.descriptor
    }

    /// The track's name
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Whether the track is still published
    pub fn active(&self) -> bool {
        *self.state.borrow() && !self.ctx.is_cancelled()
    }

    /// Mark the track ended; idempotent
    pub fn end(&self) {
        let changed = self.state.send_if_modified(|active| {
            if *active {
                *active = false;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::debug!(track = %self.descriptor.name, "track ended");
        }
    }

    /// Wait until the track becomes inactive
    ///
    /// Resolves exactly once per waiter, for waiters registered before or
    /// after the transition, including when the owning context cancels.
    pub async fn done(&self) {
        let mut state = self.state.subscribe();
        tokio::select! {
            _ = self.ctx.done() => {}
            _ = state.wait_for(|active| !*active) => {}
        }
    }
}
