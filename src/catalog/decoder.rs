//! Catalog decoder: snapshot-then-patch reconstruction
//!
//! State machine `AwaitingSnapshot → Synced`: only a version-matched init
//! record leaves the first state, and every record after it is a patch
//! batch. A patch before the init, a version mismatch or a malformed record
//! is fatal for the decode session. Add patches are the only ones that wake
//! `await_next_new_track` waiters; removals and replacements just edit the
//! reconstructed catalog.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{oneshot, watch};

use super::descriptor::TrackDescriptor;
use super::entity::TrackCatalog;
use super::error::CatalogError;
use super::patch::{CatalogInit, TrackPatch, DEFAULT_CATALOG_VERSION};
use crate::transport::{Context, GroupSource};

/// Construction parameters for a [`CatalogDecoder`]
#[derive(Debug, Clone)]
pub struct CatalogDecoderInit {
    /// Version the init record must carry, compared for exact equality
    pub version: String,
}

impl Default for CatalogDecoderInit {
    fn default() -> Self {
        Self {
            version: DEFAULT_CATALOG_VERSION.to_string(),
        }
    }
}

/// The fully reconstructed catalog handed to snapshot waiters
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSnapshot {
    /// Version the stream was synced at
    pub version: String,
    /// Every track known when the bootstrap batch was applied
    pub tracks: HashMap<String, TrackDescriptor>,
}

struct Shared {
    tracks: HashMap<String, Arc<TrackCatalog>>,
    new_track_waiters: VecDeque<oneshot::Sender<Arc<TrackCatalog>>>,
}

/// Reader side of the catalog protocol
pub struct CatalogDecoder {
    version: String,
    shared: Mutex<Shared>,
    // Set exactly once, when the bootstrap batch after the init is applied.
    snapshot: watch::Sender<Option<CatalogSnapshot>>,
}

impl CatalogDecoder {
    /// Create a decoder expecting the given version
    pub fn new(init: CatalogDecoderInit) -> Self {
        let (snapshot, _) = watch::channel(None);
        Self {
            version: init.version,
            shared: Mutex::new(Shared {
                tracks: HashMap::new(),
                new_track_waiters: VecDeque::new(),
            }),
            snapshot,
        }
    }

    /// The expected catalog version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether a track is currently in the reconstructed catalog
    pub fn has_track(&self, name: &str) -> bool {
        self.lock().tracks.contains_key(name)
    }

    /// Snapshot of the current entities
    pub fn tracks(&self) -> HashMap<String, Arc<TrackCatalog>> {
        self.lock().tracks.clone()
    }

    /// Consume one catalog stream until it ends
    ///
    /// Returns `Ok(())` on a clean end of stream, `Err(Cancelled)` when
    /// `ctx` fires, and the fatal error on a protocol violation, version
    /// mismatch or transport failure. Fatal errors fail any pending
    /// new-track waiters; no partially parsed record is applied.
    pub async fn decode_from(
        &self,
        ctx: &Context,
        source: &mut dyn GroupSource,
    ) -> Result<(), CatalogError> {
        let mut synced = false;
        let mut bootstrapped = false;

        let result = loop {
            let next = tokio::select! {
                _ = ctx.done() => break Err(CatalogError::Cancelled(ctx.reason())),
                next = source.read_frame() => next,
            };
            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(()),
                Err(err) => break Err(CatalogError::Transport(err)),
            };

            if !synced {
                let init: CatalogInit = match serde_json::from_slice(frame.bytes()) {
                    Ok(init) => init,
                    Err(err) => {
                        break Err(CatalogError::ProtocolViolation(format!(
                            "expected catalog init record: {}",
                            err
                        )))
                    }
                };
                if init.version != self.version {
                    break Err(CatalogError::VersionMismatch {
                        expected: self.version.clone(),
                        got: init.version,
                    });
                }
                synced = true;
                tracing::debug!(version = %self.version, "catalog synced");
                continue;
            }

            let patches: Vec<TrackPatch> = match serde_json::from_slice(frame.bytes()) {
                Ok(patches) => patches,
                Err(err) => {
                    break Err(CatalogError::ProtocolViolation(format!(
                        "malformed patch batch: {}",
                        err
                    )))
                }
            };

            if let Err(err) = self.apply(ctx, patches) {
                break Err(err);
            }

            if !bootstrapped {
                bootstrapped = true;
                self.publish_snapshot();
            }
        };

        match &result {
            Ok(()) | Err(CatalogError::Cancelled(_)) => {}
            Err(_) => self.fail_waiters(),
        }
        result
    }

    /// Wait for the full reconstructed catalog
    ///
    /// Resolves once the bootstrap batch has been applied; safe for any
    /// number of waiters before or after that point.
    pub async fn await_snapshot(&self, ctx: &Context) -> Result<CatalogSnapshot, CatalogError> {
        let mut snapshot = self.snapshot.subscribe();
        tokio::select! {
            _ = ctx.done() => Err(CatalogError::Cancelled(ctx.reason())),
            result = snapshot.wait_for(|snapshot| snapshot.is_some()) => match result {
                Ok(value) => match value.as_ref() {
                    Some(snapshot) => Ok(snapshot.clone()),
                    None => Err(CatalogError::Closed),
                },
                Err(_) => Err(CatalogError::Closed),
            },
        }
    }

    /// Wait for the next track added after this call
    ///
    /// Each call consumes at most one add resolution; tracks added earlier
    /// are not replayed. Waiters are resolved in registration order, one per
    /// added track.
    pub async fn await_next_new_track(
        &self,
        ctx: &Context,
    ) -> Result<Arc<TrackCatalog>, CatalogError> {
        let waiter = {
            let mut shared = self.lock();
            let (tx, rx) = oneshot::channel();
            shared.new_track_waiters.push_back(tx);
            rx
        };

        tokio::select! {
            _ = ctx.done() => Err(CatalogError::Cancelled(ctx.reason())),
            result = waiter => result.map_err(|_| CatalogError::Closed),
        }
    }

    fn apply(&self, ctx: &Context, patches: Vec<TrackPatch>) -> Result<(), CatalogError> {
        let mut shared = self.lock();

        for patch in patches {
            let name = match patch.track_name() {
                Some(name) => name.to_string(),
                None => {
                    return Err(CatalogError::ProtocolViolation(format!(
                        "patch path outside /tracks/: {}",
                        patch.path()
                    )))
                }
            };

            match patch {
                TrackPatch::Add { value, .. } => {
                    let track = Arc::new(TrackCatalog::new(ctx.clone(), value));
                    if let Some(prior) = shared.tracks.insert(name.clone(), Arc::clone(&track)) {
                        prior.end();
                    }
                    tracing::debug!(track = %name, "track added");

                    // One waiter per added track; skip waiters that gave up.
                    while let Some(waiter) = shared.new_track_waiters.pop_front() {
                        if waiter.send(Arc::clone(&track)).is_ok() {
                            break;
                        }
                    }
                }
                TrackPatch::Remove { .. } => {
                    if let Some(prior) = shared.tracks.remove(&name) {
                        prior.end();
                    }
                    tracing::debug!(track = %name, "track removed");
                }
                TrackPatch::Replace { value, .. } => {
                    let track = Arc::new(TrackCatalog::new(ctx.clone(), value));
                    if let Some(prior) = shared.tracks.insert(name.clone(), track) {
                        prior.end();
                    }
                    tracing::debug!(track = %name, "track replaced");
                }
            }
        }

        Ok(())
    }

    fn publish_snapshot(&self) {
        let tracks = {
            let shared = self.lock();
            shared
                .tracks
                .iter()
                .map(|(name, track)| (name.clone(), track.descriptor().clone()))
                .collect()
        };
        let snapshot = CatalogSnapshot {
            version: self.version.clone(),
            tracks,
        };
        self.snapshot.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(snapshot);
                true
            } else {
                false
            }
        });
    }

    fn fail_waiters(&self) {
        // Dropping the senders resolves every pending waiter with Closed.
        self.lock().new_track_waiters.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|err| err.into_inner())
    }
}
