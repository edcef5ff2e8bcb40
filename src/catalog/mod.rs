//! Catalog synchronization
//!
//! Keeps many readers' view of "which tracks exist" consistent with one
//! producer. The producer's catalog encoder streams a version-tagged init
//! record, a bootstrap batch carrying the full current state, and then one
//! patch batch (add/remove/replace) per publish, to every attached sink
//! independently. The decoder rebuilds the track set from that stream and
//! lets any number of waiters block on "the full state arrived" and "the
//! next new track appeared".
//!
//! Only `add` patches notify new-track waiters; removals and descriptor
//! replacements are root-catalog bookkeeping.

pub mod decoder;
pub mod descriptor;
pub mod encoder;
pub mod entity;
pub mod error;
pub mod patch;

pub use decoder::{CatalogDecoder, CatalogDecoderInit, CatalogSnapshot};
pub use descriptor::TrackDescriptor;
pub use encoder::{CatalogEncoder, CatalogEncoderInit};
pub use entity::TrackCatalog;
pub use error::CatalogError;
pub use patch::{CatalogInit, TrackPatch, DEFAULT_CATALOG_VERSION};
