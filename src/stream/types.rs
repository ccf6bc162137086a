//! Identifiers and frame types shared by stream handles and the registry.

use std::fmt;

use tokio::sync::mpsc;
use uuid::Uuid;

/// Identity of one physical stream connection.
///
/// A fresh id is minted every time an address is opened, so frames from a
/// handle that was closed (and possibly re-created on the same address) can
/// be told apart from frames of the live connection.
pub type ConnectionId = Uuid;

/// Stable reference to a single listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Slot a listener occupies on a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListenerKey {
    Typed(String),
    Wildcard,
}

/// A registration handed to a [`StreamHandle`](super::StreamHandle)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub key: ListenerKey,
}

/// One server-pushed event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Declared type, `None` when the server sent no (or an empty) `event:` field
    pub event_type: Option<String>,
    pub data: String,
    /// Identifier carried by this frame's own `id:` field
    pub id: Option<String>,
}

impl Frame {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            event_type: None,
            data: data.into(),
            id: None,
        }
    }

    pub fn with_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A frame tagged with the connection that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub connection: ConnectionId,
    pub frame: Frame,
}

/// Channel every handle of a session pushes its frames into
pub type FrameSink = mpsc::Sender<InboundFrame>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_id_display() {
        assert_eq!(SubscriptionId::new(3).to_string(), "sub-3");
    }

    #[test]
    fn test_frame_builder() {
        let frame = Frame::new("42").with_type("price").with_id("7");
        assert_eq!(frame.data, "42");
        assert_eq!(frame.event_type.as_deref(), Some("price"));
        assert_eq!(frame.id.as_deref(), Some("7"));
    }
}
