use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::boundary::ServerMessage;
use crate::connection_manager::{ConnectionRegistry, Route};
use crate::metrics::DispatchMetrics;
use crate::stream::{Frame, InboundFrame};

/// What happened to one inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Forwarded as a `typed_event`
    Typed,
    /// Forwarded as an `untyped_event`
    Untyped,
    /// No listener on the connection wanted it
    Unrouted,
    /// The connection it came from no longer exists
    Stale,
    /// Routed, but the outbound channel was full or closed
    Dropped,
}

/// Statistics for the event dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub typed_delivered: AtomicU64,
    pub untyped_delivered: AtomicU64,
    pub unrouted: AtomicU64,
    pub stale: AtomicU64,
    /// Notifications (of any kind) that could not be queued
    pub dropped: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            typed_delivered: self.typed_delivered.load(Ordering::Relaxed),
            untyped_delivered: self.untyped_delivered.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub typed_delivered: u64,
    pub untyped_delivered: u64,
    pub unrouted: u64,
    pub stale: u64,
    pub dropped: u64,
}

/// Routes frames to listeners and forwards them to the host.
///
/// Dispatching only reads the registry. Sending never waits: when the
/// outbound channel is full the notification is dropped and counted.
pub struct EventDispatcher {
    outbound: mpsc::Sender<ServerMessage>,
    stats: Arc<DispatcherStats>,
}

impl EventDispatcher {
    pub fn new(outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            outbound,
            stats: Arc::new(DispatcherStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<DispatcherStats> {
        self.stats.clone()
    }

    pub fn dispatch(&self, registry: &ConnectionRegistry, inbound: InboundFrame) -> DispatchOutcome {
        let Some(connection) = registry.by_id(inbound.connection) else {
            tracing::trace!(connection_id = %inbound.connection, "Frame from closed connection");
            self.stats.stale.fetch_add(1, Ordering::Relaxed);
            DispatchMetrics::record_discarded("stale_connection");
            return DispatchOutcome::Stale;
        };

        let Some(route) = connection.route(&inbound.frame) else {
            tracing::trace!(
                address = %connection.address,
                event_type = ?inbound.frame.event_type,
                "No listener for frame"
            );
            self.stats.unrouted.fetch_add(1, Ordering::Relaxed);
            DispatchMetrics::record_discarded("unrouted");
            return DispatchOutcome::Unrouted;
        };

        let outcome = match route {
            Route::Typed { .. } => DispatchOutcome::Typed,
            Route::Untyped { .. } => DispatchOutcome::Untyped,
        };

        tracing::trace!(
            address = %connection.address,
            subscription = %route.subscription(),
            "Dispatching frame"
        );

        if !self.send(notification(route, inbound.frame)) {
            return DispatchOutcome::Dropped;
        }

        match outcome {
            DispatchOutcome::Typed => self.stats.typed_delivered.fetch_add(1, Ordering::Relaxed),
            _ => self.stats.untyped_delivered.fetch_add(1, Ordering::Relaxed),
        };
        outcome
    }

    /// Queue a message for the host without waiting
    pub fn send(&self, message: ServerMessage) -> bool {
        let kind = message.kind();
        match self.outbound.try_send(message) {
            Ok(()) => {
                DispatchMetrics::record_sent(kind);
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(kind = kind, "Outbound channel full, dropping message");
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                DispatchMetrics::record_dropped("full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(kind = kind, "Outbound channel closed, dropping message");
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                DispatchMetrics::record_dropped("closed");
                false
            }
        }
    }
}

/// Build the host notification for a routed frame
pub fn notification(route: Route<'_>, frame: Frame) -> ServerMessage {
    match route {
        Route::Typed { event_type, .. } => ServerMessage::TypedEvent {
            data: frame.data,
            event_type: event_type.to_string(),
            id: frame.id,
        },
        Route::Untyped { .. } => ServerMessage::UntypedEvent {
            data: frame.data,
            id: frame.id,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{MemoryTransport, SubscriptionId};
    use uuid::Uuid;

    fn setup(capacity: usize) -> (ConnectionRegistry, EventDispatcher, mpsc::Receiver<ServerMessage>) {
        let (frames_tx, _frames_rx) = mpsc::channel(8);
        let registry = ConnectionRegistry::new(Arc::new(MemoryTransport::new()), frames_tx);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        (registry, EventDispatcher::new(out_tx), out_rx)
    }

    #[test]
    fn test_typed_notification() {
        let route = Route::Typed {
            subscription: SubscriptionId::new(1),
            event_type: "price",
        };
        let frame = Frame::new("42").with_type("price").with_id("7");
        assert_eq!(
            notification(route, frame),
            ServerMessage::TypedEvent {
                data: "42".into(),
                event_type: "price".into(),
                id: Some("7".into()),
            }
        );
    }

    #[test]
    fn test_untyped_notification_ignores_frame_type() {
        let route = Route::Untyped {
            subscription: SubscriptionId::new(1),
        };
        let frame = Frame::new("1").with_type("volume");
        assert_eq!(
            notification(route, frame),
            ServerMessage::UntypedEvent {
                data: "1".into(),
                id: None,
            }
        );
    }

    #[test]
    fn test_dispatch_routes_and_counts() {
        let (mut registry, dispatcher, mut rx) = setup(8);
        let connection = registry.ensure("/events").unwrap().id;
        registry.add_listener("/events", Some("price")).unwrap();

        let typed = InboundFrame {
            connection,
            frame: Frame::new("42").with_type("price"),
        };
        assert_eq!(dispatcher.dispatch(&registry, typed), DispatchOutcome::Typed);

        let other = InboundFrame {
            connection,
            frame: Frame::new("x").with_type("volume"),
        };
        assert_eq!(dispatcher.dispatch(&registry, other), DispatchOutcome::Unrouted);

        let stale = InboundFrame {
            connection: Uuid::new_v4(),
            frame: Frame::new("42").with_type("price"),
        };
        assert_eq!(dispatcher.dispatch(&registry, stale), DispatchOutcome::Stale);

        assert!(matches!(rx.try_recv(), Ok(ServerMessage::TypedEvent { .. })));
        assert!(rx.try_recv().is_err());

        let stats = dispatcher.stats().snapshot();
        assert_eq!(stats.typed_delivered, 1);
        assert_eq!(stats.unrouted, 1);
        assert_eq!(stats.stale, 1);
    }

    #[test]
    fn test_full_channel_drops_without_blocking() {
        let (mut registry, dispatcher, _rx) = setup(1);
        let connection = registry.ensure("/events").unwrap().id;
        registry.add_listener("/events", None).unwrap();

        let frame = || InboundFrame {
            connection,
            frame: Frame::new("ping"),
        };
        assert_eq!(dispatcher.dispatch(&registry, frame()), DispatchOutcome::Untyped);
        assert_eq!(dispatcher.dispatch(&registry, frame()), DispatchOutcome::Dropped);
        assert_eq!(dispatcher.stats().snapshot().dropped, 1);
    }
}
