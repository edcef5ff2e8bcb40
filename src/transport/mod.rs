//! Transport capability seams
//!
//! The delivery core does not speak to the network itself. It is handed a
//! small set of capabilities by the transport layer: per-group write handles,
//! per-track handles that can open groups, a byte-record sink for catalog
//! delivery, and a cancellation context. This module defines those seams,
//! the opaque error codes shared with the transport, and the frame unit that
//! flows through them.

pub mod context;
pub mod error;
pub mod frame;
pub mod sink;

pub use context::{Canceller, Context};
pub use error::{
    ErrorCode, TransportError, EXPIRED_GROUP_ERROR_CODE, INTERNAL_GROUP_ERROR_CODE,
    INTERNAL_SUBSCRIBE_ERROR_CODE, PUBLISH_ABORTED_ERROR_CODE,
};
pub use frame::{Frame, GroupSequence};
pub use sink::{GroupSink, GroupSource, StreamSink, TrackSink};
