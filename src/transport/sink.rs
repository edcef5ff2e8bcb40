//! Consumer-side capability traits
//!
//! These traits are supplied by the transport layer. The delivery core only
//! writes through them; it never implements them against a real network
//! (tests and demos use in-memory implementations).

use async_trait::async_trait;
use bytes::Bytes;

use super::error::{ErrorCode, TransportError};
use super::frame::{Frame, GroupSequence};

/// Write handle for one transport group
///
/// A group sink either receives every frame of its group in order followed by
/// `close`, or is cancelled with an error code and reason.
#[async_trait]
pub trait GroupSink: Send {
    /// Write one frame to the group
    async fn write_frame(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Finish the group normally
    async fn close(&mut self);

    /// Abandon the group with an error code and reason
    async fn cancel(&mut self, code: ErrorCode, reason: &str);
}

/// Write handle for one track subscription
#[async_trait]
pub trait TrackSink: Send {
    /// Open the transport group for `sequence`
    async fn open_group(
        &mut self,
        sequence: GroupSequence,
    ) -> Result<Box<dyn GroupSink>, TransportError>;

    /// Finish the subscription normally
    async fn close(&mut self);

    /// Tear the subscription down with an error code and reason
    async fn close_with_error(&mut self, code: ErrorCode, reason: &str);
}

/// Delimited byte-record sink for catalog delivery
///
/// Each `write` carries one complete record; the transport is responsible
/// for delimiting records on the wire.
#[async_trait]
pub trait StreamSink: Send {
    /// Write one record
    async fn write(&mut self, record: Bytes) -> Result<(), TransportError>;
}

/// Read side of a group: an ordered sequence of frames
#[async_trait]
pub trait GroupSource: Send {
    /// Read the next frame, or `None` when the group ended normally
    async fn read_frame(&mut self) -> Result<Option<Frame>, TransportError>;
}
