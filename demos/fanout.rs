//! In-memory fan-out demo: one producer, a late-joining consumer and a
//! catalog encoder/decoder pair wired through channels.
//!
//! Run with: cargo run --example fanout

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use moqcast::catalog::{CatalogDecoder, CatalogDecoderInit, CatalogEncoder, CatalogEncoderInit};
use moqcast::transport::{
    Context, ErrorCode, Frame, GroupSequence, GroupSink, GroupSource, StreamSink, TrackSink,
    TransportError,
};
use moqcast::{EncodedChunk, TrackCache, TrackCacheConfig, TrackCatalog, TrackDescriptor};

/// Group sink that logs every delivery event.
struct LogGroupSink {
    consumer: &'static str,
    sequence: GroupSequence,
}

#[async_trait]
impl GroupSink for LogGroupSink {
    async fn write_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        tracing::info!(
            consumer = self.consumer,
            sequence = self.sequence,
            bytes = frame.byte_len(),
            "frame delivered"
        );
        Ok(())
    }

    async fn close(&mut self) {
        tracing::info!(consumer = self.consumer, sequence = self.sequence, "group done");
    }

    async fn cancel(&mut self, code: ErrorCode, reason: &str) {
        tracing::info!(
            consumer = self.consumer,
            sequence = self.sequence,
            code,
            reason,
            "group abandoned"
        );
    }
}

struct LogTrackSink {
    consumer: &'static str,
}

#[async_trait]
impl TrackSink for LogTrackSink {
    async fn open_group(
        &mut self,
        sequence: GroupSequence,
    ) -> Result<Box<dyn GroupSink>, TransportError> {
        tracing::info!(consumer = self.consumer, sequence, "group opened");
        Ok(Box::new(LogGroupSink {
            consumer: self.consumer,
            sequence,
        }))
    }

    async fn close(&mut self) {
        tracing::info!(consumer = self.consumer, "track done");
    }

    async fn close_with_error(&mut self, code: ErrorCode, reason: &str) {
        tracing::warn!(consumer = self.consumer, code, reason, "track failed");
    }
}

/// Channel-backed record pipe: encoder writes, decoder reads.
struct PipeSink {
    tx: mpsc::UnboundedSender<Bytes>,
}

#[async_trait]
impl StreamSink for PipeSink {
    async fn write(&mut self, record: Bytes) -> Result<(), TransportError> {
        self.tx
            .send(record)
            .map_err(|_| TransportError::Closed)
    }
}

struct PipeSource {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

#[async_trait]
impl GroupSource for PipeSource {
    async fn read_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        Ok(self.rx.recv().await.map(Frame::new))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("moqcast=debug".parse()?)
                .add_directive("fanout=info".parse()?),
        )
        .init();

    // Media fan-out: a track cache with a 100 ms group duration.
    let track = Arc::new(TrackCache::new(
        TrackCacheConfig::default().max_group_duration(Duration::from_millis(100)),
    ));

    track
        .subscribe(
            Context::background(),
            Box::new(LogTrackSink { consumer: "early" }),
        )
        .expect("track is open");

    // First group: a key frame and two deltas.
    track.append(EncodedChunk::key(0, Bytes::from_static(b"k0")));
    track.append(EncodedChunk::delta(33_000, Bytes::from_static(b"d1")));
    track.append(EncodedChunk::delta(66_000, Bytes::from_static(b"d2")));

    // A late joiner still receives the first group's backlog.
    track
        .subscribe(
            Context::background(),
            Box::new(LogTrackSink { consumer: "late" }),
        )
        .expect("track is open");

    // This key frame is past the group duration: rollover to group 2.
    track.append(EncodedChunk::key(150_000, Bytes::from_static(b"k1")));
    track.append(EncodedChunk::delta(183_000, Bytes::from_static(b"d3")));

    track.close();

    // Let the delivery tasks drain before moving on.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Catalog sync over an in-memory pipe. The video track is published
    // before any reader attaches, so it arrives via the bootstrap record.
    let encoder = Arc::new(CatalogEncoder::new(CatalogEncoderInit::default()));
    let decoder = Arc::new(CatalogDecoder::new(CatalogDecoderInit::default()));

    let video = Arc::new(TrackCatalog::new(
        Context::background(),
        TrackDescriptor::new(
            "video",
            0,
            "h264",
            serde_json::json!({"width": 1280, "height": 720}),
        ),
    ));
    encoder.set_track(video);

    let (tx, rx) = mpsc::unbounded_channel();
    let encoder_task = {
        let encoder = Arc::clone(&encoder);
        tokio::spawn(async move {
            let mut sink = PipeSink { tx };
            encoder.stream_to(&Context::background(), &mut sink).await
        })
    };
    let decoder_task = {
        let decoder = Arc::clone(&decoder);
        tokio::spawn(async move {
            let mut source = PipeSource { rx };
            decoder
                .decode_from(&Context::background(), &mut source)
                .await
        })
    };

    let snapshot = decoder
        .await_snapshot(&Context::background())
        .await
        .expect("snapshot");
    tracing::info!(tracks = snapshot.tracks.len(), "catalog snapshot received");

    // Park a waiter, then announce a new audio track.
    let waiter = {
        let decoder = Arc::clone(&decoder);
        tokio::spawn(async move { decoder.await_next_new_track(&Context::background()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let audio = Arc::new(TrackCatalog::new(
        Context::background(),
        TrackDescriptor::new("audio", 10, "opus", serde_json::json!({"channels": 2})),
    ));
    encoder.publish(&[audio]).expect("publish");

    let added = waiter.await.expect("join").expect("new track");
    tracing::info!(track = added.name(), "new track announced");

    encoder.close();
    encoder_task.await?.expect("encoder stream");
    decoder_task.await?.expect("decoder stream");

    Ok(())
}
