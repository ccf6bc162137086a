//! Physical event stream connections.
//!
//! A [`StreamTransport`] opens one [`StreamHandle`] per address. Handles push
//! every decoded frame their listeners care about into the session's
//! [`FrameSink`], tagged with the [`ConnectionId`] minted at open time.
//! Reconnection after a dropped connection happens inside the handle and is
//! invisible to callers: it simply shows up as more frames.

mod backoff;
mod decoder;
mod interest;
mod memory;
mod sse;
mod types;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use decoder::FrameDecoder;
pub use interest::Interest;
pub use memory::{HandleEvent, MemoryTransport};
pub use sse::{SseHandle, SseTransport};
pub use types::{
    ConnectionId, Frame, FrameSink, InboundFrame, ListenerKey, Subscription, SubscriptionId,
};

use crate::error::BridgeError;

/// One open streaming connection
pub trait StreamHandle: Send {
    /// Start delivering frames matching `subscription.key`
    fn attach(&mut self, subscription: Subscription);

    /// Stop delivering for `id`. Returns false if it was not attached.
    fn detach(&mut self, id: SubscriptionId) -> bool;

    /// Detach `old` and attach `new` in one step. Handles that filter frames
    /// on another task override this so the slot never reads as empty.
    fn replace(&mut self, old: SubscriptionId, new: Subscription) -> bool {
        let detached = self.detach(old);
        self.attach(new);
        detached
    }

    /// Stop the connection and drop all attached interest. Frames already
    /// queued in the sink may still arrive; the session discards them.
    fn close(&mut self);
}

/// Opens stream handles
pub trait StreamTransport: Send + Sync {
    fn open(
        &self,
        connection: ConnectionId,
        address: &str,
        frames: FrameSink,
    ) -> Result<Box<dyn StreamHandle>, BridgeError>;
}
