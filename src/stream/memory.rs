//! In-process transport.
//!
//! Frames are pushed by the embedding code instead of read from the network,
//! and every handle operation is recorded. Used to drive sessions without an
//! HTTP server and to observe the exact attach/detach/close sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::error::BridgeError;

use super::interest::Interest;
use super::types::{ConnectionId, Frame, FrameSink, InboundFrame, Subscription, SubscriptionId};
use super::{StreamHandle, StreamTransport};

/// Operation observed on a memory handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleEvent {
    Opened { address: String },
    Attached { address: String, subscription: Subscription },
    Detached { address: String, id: SubscriptionId },
    Closed { address: String },
}

#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    log: Mutex<Vec<HandleEvent>>,
    streams: DashMap<String, MemoryStream>,
}

#[derive(Clone)]
struct MemoryStream {
    connection: ConnectionId,
    sink: FrameSink,
    interest: Interest,
    closed: Arc<AtomicBool>,
}

impl MemoryInner {
    fn record(&self, event: HandleEvent) {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every handle operation so far, in order
    pub fn events(&self) -> Vec<HandleEvent> {
        self.inner
            .log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear_events(&self) {
        self.inner
            .log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Number of times `address` was opened
    pub fn open_count(&self, address: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, HandleEvent::Opened { address: a } if a == address))
            .count()
    }

    pub fn is_open(&self, address: &str) -> bool {
        self.inner
            .streams
            .get(address)
            .map(|s| !s.closed.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Subscriptions currently attached to the handle for `address`
    pub fn attached(&self, address: &str) -> Vec<Subscription> {
        self.inner
            .streams
            .get(address)
            .map(|s| s.interest.subscriptions())
            .unwrap_or_default()
    }

    /// Push a frame as if the server had sent it on `address`.
    ///
    /// Returns true when the frame was queued for the session, false when
    /// the stream is closed, nobody listens for it, or the sink is full.
    pub fn push(&self, address: &str, frame: Frame) -> bool {
        let stream = match self.inner.streams.get(address) {
            Some(s) => s.clone(),
            None => return false,
        };

        if stream.closed.load(Ordering::Acquire) || !stream.interest.wants(&frame) {
            return false;
        }

        stream
            .sink
            .try_send(InboundFrame {
                connection: stream.connection,
                frame,
            })
            .is_ok()
    }
}

impl StreamTransport for MemoryTransport {
    fn open(
        &self,
        connection: ConnectionId,
        address: &str,
        frames: FrameSink,
    ) -> Result<Box<dyn StreamHandle>, BridgeError> {
        if address.trim().is_empty() {
            return Err(BridgeError::invalid_address(address, "empty address"));
        }

        let stream = MemoryStream {
            connection,
            sink: frames,
            interest: Interest::new(),
            closed: Arc::new(AtomicBool::new(false)),
        };
        self.inner.streams.insert(address.to_string(), stream.clone());
        self.inner.record(HandleEvent::Opened {
            address: address.to_string(),
        });

        Ok(Box::new(MemoryHandle {
            address: address.to_string(),
            stream,
            inner: self.inner.clone(),
        }))
    }
}

struct MemoryHandle {
    address: String,
    stream: MemoryStream,
    inner: Arc<MemoryInner>,
}

impl StreamHandle for MemoryHandle {
    fn attach(&mut self, subscription: Subscription) {
        self.stream.interest.attach(subscription.clone());
        self.inner.record(HandleEvent::Attached {
            address: self.address.clone(),
            subscription,
        });
    }

    fn detach(&mut self, id: SubscriptionId) -> bool {
        let detached = self.stream.interest.detach(id);
        if detached {
            self.inner.record(HandleEvent::Detached {
                address: self.address.clone(),
                id,
            });
        }
        detached
    }

    fn replace(&mut self, old: SubscriptionId, new: Subscription) -> bool {
        let detached = self.stream.interest.replace(old, new.clone());
        if detached {
            self.inner.record(HandleEvent::Detached {
                address: self.address.clone(),
                id: old,
            });
        }
        self.inner.record(HandleEvent::Attached {
            address: self.address.clone(),
            subscription: new,
        });
        detached
    }

    fn close(&mut self) {
        if self.stream.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stream.interest.clear();
        self.inner.record(HandleEvent::Closed {
            address: self.address.clone(),
        });
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ListenerKey;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[test]
    fn test_push_respects_interest_and_close() {
        let transport = MemoryTransport::new();
        let (tx, mut rx) = mpsc::channel(8);
        let connection = Uuid::new_v4();
        let mut handle = transport.open(connection, "/events", tx).unwrap();

        assert!(!transport.push("/events", Frame::new("ignored")));

        handle.attach(Subscription {
            id: SubscriptionId::new(1),
            key: ListenerKey::Wildcard,
        });
        assert!(transport.push("/events", Frame::new("ping")));
        let inbound = rx.try_recv().unwrap();
        assert_eq!(inbound.connection, connection);
        assert_eq!(inbound.frame, Frame::new("ping"));

        handle.close();
        assert!(!transport.is_open("/events"));
        assert!(!transport.push("/events", Frame::new("late")));
    }

    #[test]
    fn test_records_operations_in_order() {
        let transport = MemoryTransport::new();
        let (tx, _rx) = mpsc::channel(8);
        let mut handle = transport.open(Uuid::new_v4(), "/a", tx).unwrap();
        let sub = Subscription {
            id: SubscriptionId::new(3),
            key: ListenerKey::Typed("price".into()),
        };
        handle.attach(sub.clone());
        handle.detach(sub.id);
        drop(handle);

        assert_eq!(
            transport.events(),
            vec![
                HandleEvent::Opened { address: "/a".into() },
                HandleEvent::Attached {
                    address: "/a".into(),
                    subscription: sub.clone(),
                },
                HandleEvent::Detached {
                    address: "/a".into(),
                    id: sub.id,
                },
                HandleEvent::Closed { address: "/a".into() },
            ]
        );
    }

    #[test]
    fn test_rejects_empty_address() {
        let transport = MemoryTransport::new();
        let (tx, _rx) = mpsc::channel(1);
        let err = transport.open(Uuid::new_v4(), "  ", tx).err().unwrap();
        assert_eq!(err.code(), "INVALID_ADDRESS");
    }
}
