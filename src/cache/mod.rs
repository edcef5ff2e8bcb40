//! Group buffering and fan-out
//!
//! A track is delivered as a sequence of groups; each group is a bounded,
//! replayable log of frames that a decoder can enter at its first frame. The
//! cache buffers the live group, fans it out to any number of consumers and
//! replays the backlog to late joiners.
//!
//! # Architecture
//!
//! ```text
//!   encoder chunks ──► TrackCache ──rollover──► GroupCache(seq, ts)
//!                          │                        │ frames: replayable log
//!                          │ per-consumer queue     │
//!             ┌────────────┼────────────┐           │
//!             ▼            ▼            ▼           │
//!        [delivery]   [delivery]   [delivery]  ◄────┘ flush(): snapshot,
//!         TrackSink    TrackSink    TrackSink         drain, wait, repeat
//! ```
//!
//! Every flush reads the group's frame log through its own cursor, so N
//! consumers each see the full history independently. Waiting consumers are
//! woken by a broadcast epoch; append, close and expire each wake every
//! blocked flush exactly once per event.

pub mod chunk;
pub mod config;
pub mod error;
pub mod group;
pub mod track;

pub use chunk::{ChunkKind, EncodedChunk};
pub use config::TrackCacheConfig;
pub use error::CacheError;
pub use group::GroupCache;
pub use track::TrackCache;
