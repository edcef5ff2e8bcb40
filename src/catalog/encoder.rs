//! Catalog encoder: the producer's source of truth and patch broadcaster
//!
//! Mutations (`set_track`/`remove_track`) queue patches; `sync` encodes the
//! queued batch once and delivers it to every attached stream. Each
//! `stream_to` caller gets its own delivery channel fed with the same
//! logical patch stream (broadcast, not competing consumers), prefixed by an
//! init record and a bootstrap batch carrying the full current state.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

use super::descriptor::TrackDescriptor;
use super::entity::TrackCatalog;
use super::error::CatalogError;
use super::patch::{CatalogInit, TrackPatch, DEFAULT_CATALOG_VERSION};
use crate::transport::{Context, StreamSink};

/// Construction parameters for a [`CatalogEncoder`]
#[derive(Debug, Clone)]
pub struct CatalogEncoderInit {
    /// Version written into the init record
    pub version: String,
    /// Optional catalog description
    pub description: Option<String>,
}

impl Default for CatalogEncoderInit {
    fn default() -> Self {
        Self {
            version: DEFAULT_CATALOG_VERSION.to_string(),
            description: None,
        }
    }
}

struct SinkChannel {
    id: u64,
    records: mpsc::UnboundedSender<Bytes>,
}

struct Shared {
    tracks: HashMap<String, Arc<TrackCatalog>>,
    // Patches queued since the last delivered batch. Only ever non-empty
    // while no sink is attached; the first sink's bootstrap supersedes them.
    pending: Vec<TrackPatch>,
    sinks: Vec<SinkChannel>,
    next_sink_id: u64,
}

/// Producer side of the catalog protocol
pub struct CatalogEncoder {
    version: String,
    description: Option<String>,
    shared: Mutex<Shared>,
}

impl CatalogEncoder {
    /// Create an encoder with an empty catalog
    pub fn new(init: CatalogEncoderInit) -> Self {
        Self {
            version: init.version,
            description: init.description,
            shared: Mutex::new(Shared {
                tracks: HashMap::new(),
                pending: Vec::new(),
                sinks: Vec::new(),
                next_sink_id: 0,
            }),
        }
    }

    /// The catalog version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The catalog description
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Whether a track is currently in the catalog
    pub fn has_track(&self, name: &str) -> bool {
        self.lock().tracks.contains_key(name)
    }

    /// Snapshot of the current descriptors
    pub fn tracks(&self) -> HashMap<String, TrackDescriptor> {
        self.lock()
            .tracks
            .iter()
            .map(|(name, track)| (name.clone(), track.descriptor().clone()))
            .collect()
    }

    /// Add or update one track
    ///
    /// Queues an add patch for an unknown name, a replace patch when the
    /// descriptor structurally changed, and nothing when it is equal.
    pub fn set_track(&self, track: Arc<TrackCatalog>) {
        let mut shared = self.lock();
        Self::record_track(&mut shared, track);
    }

    /// Remove one track
    ///
    /// Queues a remove patch and ends the removed entity.
    pub fn remove_track(&self, name: &str) {
        let mut shared = self.lock();
        shared.pending.push(TrackPatch::remove(name));
        if let Some(track) = shared.tracks.remove(name) {
            track.end();
        }
    }

    /// Deliver the queued patch batch to every attached sink
    ///
    /// No-op without queued patches. With zero sinks attached the batch is
    /// retained for the next attach rather than delivered.
    pub fn sync(&self) -> Result<(), CatalogError> {
        let mut shared = self.lock();
        if shared.pending.is_empty() {
            return Ok(());
        }
        if shared.sinks.is_empty() {
            return Ok(());
        }

        let record = encode_record(&shared.pending)?;
        shared.pending.clear();
        shared
            .sinks
            .retain(|sink| sink.records.send(record.clone()).is_ok());

        tracing::debug!(sinks = shared.sinks.len(), "patch batch delivered");
        Ok(())
    }

    /// Publish a batch of tracks, then sync
    ///
    /// A name appearing twice in one call is contradictory and encoded as an
    /// explicit removal marker rather than a double add. Inactive entities
    /// are skipped. Already-known, structurally unchanged tracks produce no
    /// patch.
    pub fn publish(&self, tracks: &[Arc<TrackCatalog>]) -> Result<(), CatalogError> {
        if tracks.is_empty() {
            return Ok(());
        }

        {
            let mut shared = self.lock();
            let mut seen: HashSet<String> = HashSet::new();
            for track in tracks {
                if !seen.insert(track.name().to_string()) {
                    shared.pending.push(TrackPatch::remove(track.name()));
                    continue;
                }
                if !track.active() {
                    continue;
                }
                Self::record_track(&mut shared, Arc::clone(track));
            }
        }

        self.sync()
    }

    /// Stream the catalog to one sink until its context ends
    ///
    /// Writes the init record (a failure here returns before anything is
    /// registered), then the bootstrap batch carrying every active track,
    /// then every subsequent patch batch in publish order. Returns
    /// `Err(Cancelled)` when `ctx` fires and `Ok(())` when the encoder shuts
    /// down; a write failure detaches only this sink.
    pub async fn stream_to(
        &self,
        ctx: &Context,
        sink: &mut dyn StreamSink,
    ) -> Result<(), CatalogError> {
        let init = CatalogInit {
            version: self.version.clone(),
            description: self.description.clone(),
        };
        sink.write(encode_record(&init)?).await?;

        // Register and snapshot the bootstrap under one lock so no sync
        // batch is lost or duplicated in between.
        let (id, bootstrap, mut records) = {
            let mut shared = self.lock();

            let batch: Vec<TrackPatch> = shared
                .tracks
                .values()
                .filter(|track| track.active())
                .map(|track| TrackPatch::add(track.descriptor().clone()))
                .collect();
            let bootstrap = encode_record(&batch)?;

            // Patches retained while no sink existed are superseded by the
            // bootstrap state.
            shared.pending.clear();

            let (tx, rx) = mpsc::unbounded_channel();
            let id = shared.next_sink_id;
            shared.next_sink_id += 1;
            shared.sinks.push(SinkChannel { id, records: tx });

            tracing::info!(sinks = shared.sinks.len(), "catalog sink attached");
            (id, bootstrap, rx)
        };

        let result = async {
            sink.write(bootstrap).await?;

            loop {
                let record = tokio::select! {
                    _ = ctx.done() => return Err(CatalogError::Cancelled(ctx.reason())),
                    record = records.recv() => record,
                };
                match record {
                    Some(record) => sink.write(record).await?,
                    None => return Ok(()),
                }
            }
        }
        .await;

        self.detach(id);
        result
    }

    /// Shut the encoder down; every `stream_to` loop ends normally
    pub fn close(&self) {
        let mut shared = self.lock();
        shared.sinks.clear();
        tracing::info!("catalog encoder closed");
    }

    fn record_track(shared: &mut Shared, track: Arc<TrackCatalog>) {
        let name = track.name().to_string();
        match shared.tracks.get(&name) {
            None => {
                shared
                    .pending
                    .push(TrackPatch::add(track.descriptor().clone()));
            }
            Some(existing) if existing.descriptor() != track.descriptor() => {
                shared
                    .pending
                    .push(TrackPatch::replace(track.descriptor().clone()));
            }
            Some(_) => {}
        }
        shared.tracks.insert(name, track);
    }

    fn detach(&self, id: u64) {
        let mut shared = self.lock();
        shared.sinks.retain(|sink| sink.id != id);
        tracing::info!(sinks = shared.sinks.len(), "catalog sink detached");
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|err| err.into_inner())
    }
}

fn encode_record<T: Serialize>(value: &T) -> Result<Bytes, CatalogError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|err| CatalogError::Encode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::transport::TransportError;

    #[derive(Default)]
    struct StreamLog {
        records: Vec<Bytes>,
        fail_writes: bool,
    }

    struct TestStreamSink {
        log: Arc<Mutex<StreamLog>>,
    }

    impl TestStreamSink {
        fn new() -> (Self, Arc<Mutex<StreamLog>>) {
            let log = Arc::new(Mutex::new(StreamLog::default()));
            (
                Self {
                    log: Arc::clone(&log),
                },
                log,
            )
        }
    }

    #[async_trait]
    impl StreamSink for TestStreamSink {
        async fn write(&mut self, record: Bytes) -> Result<(), TransportError> {
            let mut log = self.log.lock().unwrap();
            if log.fail_writes {
                return Err(TransportError::Write("sink gone".to_string()));
            }
            log.records.push(record);
            Ok(())
        }
    }

    fn video_track() -> Arc<TrackCatalog> {
        Arc::new(TrackCatalog::new(
            Context::background(),
            TrackDescriptor::new("video", 0, "h264", json!({"width": 1920})),
        ))
    }

    fn audio_track() -> Arc<TrackCatalog> {
        Arc::new(TrackCatalog::new(
            Context::background(),
            TrackDescriptor::new("audio", 10, "opus", json!({"channels": 2})),
        ))
    }

    fn patches(record: &Bytes) -> Vec<TrackPatch> {
        serde_json::from_slice(record).unwrap()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    /// Spawn a stream_to loop and return the shared record log.
    fn attach(
        encoder: &Arc<CatalogEncoder>,
        ctx: Context,
    ) -> (
        Arc<Mutex<StreamLog>>,
        tokio::task::JoinHandle<Result<(), CatalogError>>,
    ) {
        let (mut sink, log) = TestStreamSink::new();
        let encoder = Arc::clone(encoder);
        let handle = tokio::spawn(async move { encoder.stream_to(&ctx, &mut sink).await });
        (log, handle)
    }

    #[tokio::test]
    async fn test_stream_starts_with_init_and_bootstrap() {
        let encoder = Arc::new(CatalogEncoder::new(CatalogEncoderInit::default()));
        let (log, _handle) = attach(&encoder, Context::background());
        settle().await;

        let log = log.lock().unwrap();
        assert_eq!(log.records.len(), 2);

        let init: CatalogInit = serde_json::from_slice(&log.records[0]).unwrap();
        assert_eq!(init.version, DEFAULT_CATALOG_VERSION);

        // Empty catalog still gets a bootstrap batch.
        assert!(patches(&log.records[1]).is_empty());
    }

    #[tokio::test]
    async fn test_publish_new_tracks_emits_adds() {
        let encoder = Arc::new(CatalogEncoder::new(CatalogEncoderInit::default()));
        let (log, _handle) = attach(&encoder, Context::background());
        settle().await;

        encoder.publish(&[video_track(), audio_track()]).unwrap();
        settle().await;

        let log = log.lock().unwrap();
        assert_eq!(log.records.len(), 3);

        let batch = patches(&log.records[2]);
        assert_eq!(batch.len(), 2);
        assert!(batch
            .iter()
            .all(|patch| matches!(patch, TrackPatch::Add { .. })));
    }

    #[tokio::test]
    async fn test_republish_unchanged_emits_nothing() {
        let encoder = Arc::new(CatalogEncoder::new(CatalogEncoderInit::default()));
        let (log, _handle) = attach(&encoder, Context::background());
        settle().await;

        let video = video_track();
        encoder.publish(&[Arc::clone(&video)]).unwrap();
        settle().await;
        let records_before = log.lock().unwrap().records.len();

        encoder.publish(&[video]).unwrap();
        settle().await;

        assert_eq!(log.lock().unwrap().records.len(), records_before);
    }

    #[tokio::test]
    async fn test_structural_change_emits_replace() {
        let encoder = Arc::new(CatalogEncoder::new(CatalogEncoderInit::default()));
        let (log, _handle) = attach(&encoder, Context::background());
        settle().await;

        encoder.publish(&[video_track()]).unwrap();

        let changed = Arc::new(TrackCatalog::new(
            Context::background(),
            TrackDescriptor::new("video", 0, "h264", json!({"width": 1280})),
        ));
        encoder.publish(&[changed]).unwrap();
        settle().await;

        let log = log.lock().unwrap();
        let batch = patches(&log.records[log.records.len() - 1]);
        assert_eq!(batch.len(), 1);
        assert!(matches!(batch[0], TrackPatch::Replace { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_name_in_batch_becomes_removal_marker() {
        let encoder = Arc::new(CatalogEncoder::new(CatalogEncoderInit::default()));
        let (log, _handle) = attach(&encoder, Context::background());
        settle().await;

        encoder.publish(&[video_track(), video_track()]).unwrap();
        settle().await;

        let log = log.lock().unwrap();
        let batch = patches(&log.records[log.records.len() - 1]);
        assert_eq!(batch.len(), 2);
        assert!(matches!(batch[0], TrackPatch::Add { .. }));
        assert!(matches!(batch[1], TrackPatch::Remove { .. }));
    }

    #[tokio::test]
    async fn test_inactive_tracks_are_skipped() {
        let encoder = Arc::new(CatalogEncoder::new(CatalogEncoderInit::default()));
        let (log, _handle) = attach(&encoder, Context::background());
        settle().await;

        let ended = video_track();
        ended.end();
        encoder.publish(&[ended]).unwrap();
        settle().await;

        let log = log.lock().unwrap();
        // Init and bootstrap only; the skipped track produced no batch.
        assert_eq!(log.records.len(), 2);
    }

    #[tokio::test]
    async fn test_retained_patches_superseded_by_bootstrap() {
        let encoder = Arc::new(CatalogEncoder::new(CatalogEncoderInit::default()));

        // No sink attached: the patch is retained, not lost.
        encoder.set_track(video_track());
        encoder.sync().unwrap();

        let (log, _handle) = attach(&encoder, Context::background());
        settle().await;

        let log = log.lock().unwrap();
        assert_eq!(log.records.len(), 2);
        let bootstrap = patches(&log.records[1]);
        assert_eq!(bootstrap.len(), 1);
        assert!(matches!(bootstrap[0], TrackPatch::Add { .. }));
    }

    #[tokio::test]
    async fn test_init_write_failure_does_not_register() {
        let encoder = Arc::new(CatalogEncoder::new(CatalogEncoderInit::default()));

        let (mut sink, log) = TestStreamSink::new();
        log.lock().unwrap().fail_writes = true;

        let ctx = Context::background();
        let result = encoder.stream_to(&ctx, &mut sink).await;
        assert!(matches!(result, Err(CatalogError::Transport(_))));

        // Nothing was registered, so a publish finds zero sinks and retains.
        encoder.publish(&[video_track()]).unwrap();
        assert!(log.lock().unwrap().records.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_is_terminal_result() {
        let encoder = Arc::new(CatalogEncoder::new(CatalogEncoderInit::default()));
        let (ctx, canceller) = Context::cancellable();
        let (_log, handle) = attach(&encoder, ctx);
        settle().await;

        canceller.cancel("viewer left");

        let result = handle.await.unwrap();
        assert_eq!(
            result,
            Err(CatalogError::Cancelled(Some("viewer left".to_string())))
        );
        assert!(result.unwrap_err().is_cancellation());
    }

    #[tokio::test]
    async fn test_close_ends_streams_normally() {
        let encoder = Arc::new(CatalogEncoder::new(CatalogEncoderInit::default()));
        let (_log, handle) = attach(&encoder, Context::background());
        settle().await;

        encoder.close();

        assert_eq!(handle.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_broadcast_to_multiple_sinks() {
        let encoder = Arc::new(CatalogEncoder::new(CatalogEncoderInit::default()));
        let (log1, _h1) = attach(&encoder, Context::background());
        let (log2, _h2) = attach(&encoder, Context::background());
        settle().await;

        encoder.publish(&[video_track()]).unwrap();
        settle().await;

        for log in [log1, log2] {
            let log = log.lock().unwrap();
            assert_eq!(log.records.len(), 3);
            assert_eq!(patches(&log.records[2]).len(), 1);
        }
    }

    #[tokio::test]
    async fn test_remove_track_ends_entity() {
        let encoder = CatalogEncoder::new(CatalogEncoderInit::default());
        let video = video_track();
        encoder.set_track(Arc::clone(&video));

        encoder.remove_track("video");

        assert!(!video.active());
        assert!(!encoder.has_track("video"));
    }
}
