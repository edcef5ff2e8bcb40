//! # moqcast
//!
//! Delivery core for live media publishing over an abstract transport: it
//! buffers the ordered frames a single encoder produces and fans them out to
//! any number of concurrently attached consumers, replaying the backlog to
//! late joiners, and it keeps every reader's view of the published track set
//! in sync with the producer through an incremental patch protocol.
//!
//! # Overview
//!
//! ```text
//!   encoder ──chunks──► TrackCache ──groups──► GroupCache ──flush──► GroupSink
//!                            │                                        (per consumer)
//!                            └── descriptors ──► CatalogEncoder ──records──► StreamSink
//!                                                                       (per reader)
//!                                 CatalogDecoder ◄──records── transport
//!                                     │ await_snapshot / await_next_new_track
//! ```
//!
//! The crate does not open network streams itself; transports supply the
//! [`transport::GroupSink`], [`transport::TrackSink`],
//! [`transport::StreamSink`] and [`transport::GroupSource`] capabilities,
//! and every blocking operation is scoped to a [`transport::Context`].
//! Codec engines, rendering and the byte-level framing of frames live
//! outside this crate.

pub mod cache;
pub mod catalog;
pub mod transport;

pub use cache::{CacheError, ChunkKind, EncodedChunk, GroupCache, TrackCache, TrackCacheConfig};
pub use catalog::{
    CatalogDecoder, CatalogDecoderInit, CatalogEncoder, CatalogEncoderInit, CatalogError,
    CatalogInit, CatalogSnapshot, TrackCatalog, TrackDescriptor, TrackPatch,
    DEFAULT_CATALOG_VERSION,
};
pub use transport::{Canceller, Context, ErrorCode, Frame, GroupSequence, TransportError};
