use std::collections::HashMap;

use crate::stream::{Frame, ListenerKey, StreamHandle, Subscription, SubscriptionId};

/// Delivery path chosen for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Typed {
        subscription: SubscriptionId,
        event_type: &'a str,
    },
    Untyped {
        subscription: SubscriptionId,
    },
}

impl Route<'_> {
    pub fn subscription(&self) -> SubscriptionId {
        match self {
            Route::Typed { subscription, .. } | Route::Untyped { subscription } => *subscription,
        }
    }
}

/// Listeners registered on one connection.
///
/// At most one subscription per event type plus one wildcard slot. Every
/// mutation keeps the stream handle in step. A replaced registration goes
/// through [`StreamHandle::replace`]: the old subscription is detached before
/// its successor is attached, and the handle never sees the slot unregistered.
#[derive(Debug, Default)]
pub struct ListenerTable {
    typed: HashMap<String, SubscriptionId>,
    wildcard: Option<SubscriptionId>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` for `event_type`, returning the subscription it replaced
    pub fn add_typed(
        &mut self,
        handle: &mut dyn StreamHandle,
        event_type: &str,
        id: SubscriptionId,
    ) -> Option<SubscriptionId> {
        let subscription = Subscription {
            id,
            key: ListenerKey::Typed(event_type.to_string()),
        };
        let previous = self.typed.insert(event_type.to_string(), id);
        match previous {
            Some(old) => {
                handle.replace(old, subscription);
            }
            None => handle.attach(subscription),
        }
        previous
    }

    /// Fill the wildcard slot, returning the subscription it replaced
    pub fn add_untyped(
        &mut self,
        handle: &mut dyn StreamHandle,
        id: SubscriptionId,
    ) -> Option<SubscriptionId> {
        let subscription = Subscription {
            id,
            key: ListenerKey::Wildcard,
        };
        let previous = self.wildcard.replace(id);
        match previous {
            Some(old) => {
                handle.replace(old, subscription);
            }
            None => handle.attach(subscription),
        }
        previous
    }

    pub fn remove_typed(
        &mut self,
        handle: &mut dyn StreamHandle,
        event_type: &str,
    ) -> Option<SubscriptionId> {
        let id = self.typed.remove(event_type)?;
        handle.detach(id);
        Some(id)
    }

    pub fn remove_untyped(&mut self, handle: &mut dyn StreamHandle) -> Option<SubscriptionId> {
        let id = self.wildcard.take()?;
        handle.detach(id);
        Some(id)
    }

    /// Detach every registration from `handle`, returning how many there were
    pub fn detach_all(&mut self, handle: &mut dyn StreamHandle) -> usize {
        let mut count = 0;
        for (_, id) in self.typed.drain() {
            handle.detach(id);
            count += 1;
        }
        if let Some(id) = self.wildcard.take() {
            handle.detach(id);
            count += 1;
        }
        count
    }

    /// Pick the single listener that receives `frame`.
    ///
    /// A typed match wins; otherwise the wildcard slot takes it. A frame
    /// matching neither yields `None` and is dropped.
    pub fn route(&self, frame: &Frame) -> Option<Route<'_>> {
        if let Some(event_type) = frame.event_type.as_deref() {
            if let Some((event_type, id)) = self.typed.get_key_value(event_type) {
                return Some(Route::Typed {
                    subscription: *id,
                    event_type: event_type.as_str(),
                });
            }
        }

        self.wildcard
            .map(|subscription| Route::Untyped { subscription })
    }

    pub fn typed_listener(&self, event_type: &str) -> Option<SubscriptionId> {
        self.typed.get(event_type).copied()
    }

    pub fn untyped_listener(&self) -> Option<SubscriptionId> {
        self.wildcard
    }

    /// Registered event types, sorted
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.typed.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.typed.len() + usize::from(self.wildcard.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
