//! Listener slots attached to a handle, shared with whatever produces its frames.

use std::sync::Arc;

use dashmap::DashMap;

use super::types::{Frame, ListenerKey, Subscription, SubscriptionId};

#[derive(Debug, Clone, Default)]
pub struct Interest {
    slots: Arc<DashMap<ListenerKey, SubscriptionId>>,
}

impl Interest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, subscription: Subscription) {
        self.slots.insert(subscription.key, subscription.id);
    }

    pub fn detach(&self, id: SubscriptionId) -> bool {
        // Resolve the key first; removing while iterating would deadlock the shard
        let key = self
            .slots
            .iter()
            .find(|entry| *entry.value() == id)
            .map(|entry| entry.key().clone());

        match key {
            Some(key) => self.slots.remove_if(&key, |_, v| *v == id).is_some(),
            None => false,
        }
    }

    /// Swap `old` for `new`. A concurrent [`Interest::wants`] for the key
    /// sees either subscription, never neither.
    pub fn replace(&self, old: SubscriptionId, new: Subscription) -> bool {
        match self.slots.insert(new.key, new.id) {
            Some(previous) if previous == old => true,
            _ => self.detach(old),
        }
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Whether any attached listener could receive `frame`
    pub fn wants(&self, frame: &Frame) -> bool {
        if let Some(event_type) = &frame.event_type {
            if self
                .slots
                .contains_key(&ListenerKey::Typed(event_type.clone()))
            {
                return true;
            }
        }
        self.slots.contains_key(&ListenerKey::Wildcard)
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        let mut subs: Vec<Subscription> = self
            .slots
            .iter()
            .map(|entry| Subscription {
                id: *entry.value(),
                key: entry.key().clone(),
            })
            .collect();
        subs.sort_by_key(|s| s.id);
        subs
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn typed(id: u64, event_type: &str) -> Subscription {
        Subscription {
            id: SubscriptionId::new(id),
            key: ListenerKey::Typed(event_type.to_string()),
        }
    }

    #[test]
    fn test_wants_typed_and_wildcard() {
        let interest = Interest::new();
        let price = Frame::new("42").with_type("price");
        let ping = Frame::new("ping");

        assert!(!interest.wants(&price));

        interest.attach(typed(1, "price"));
        assert!(interest.wants(&price));
        assert!(!interest.wants(&ping));

        interest.attach(Subscription {
            id: SubscriptionId::new(2),
            key: ListenerKey::Wildcard,
        });
        assert!(interest.wants(&ping));
        assert!(interest.wants(&Frame::new("x").with_type("other")));
    }

    #[test]
    fn test_detach_by_id() {
        let interest = Interest::new();
        interest.attach(typed(1, "price"));
        interest.attach(typed(2, "volume"));

        assert!(interest.detach(SubscriptionId::new(1)));
        assert!(!interest.detach(SubscriptionId::new(1)));
        assert_eq!(interest.subscriptions(), vec![typed(2, "volume")]);
    }

    #[test]
    fn test_stale_id_does_not_detach_replacement() {
        let interest = Interest::new();
        interest.attach(typed(1, "price"));
        interest.attach(typed(2, "price"));

        assert!(!interest.detach(SubscriptionId::new(1)));
        assert_eq!(interest.len(), 1);
    }

    #[test]
    fn test_replace_swaps_subscription() {
        let interest = Interest::new();
        interest.attach(typed(1, "price"));

        assert!(interest.replace(SubscriptionId::new(1), typed(2, "price")));
        assert_eq!(interest.subscriptions(), vec![typed(2, "price")]);

        // Unknown old id: the new one still lands
        assert!(!interest.replace(SubscriptionId::new(7), typed(3, "volume")));
        assert_eq!(interest.len(), 2);
    }

    #[test]
    fn test_replace_never_leaves_slot_empty() {
        let interest = Interest::new();
        interest.attach(typed(0, "price"));
        let stop = Arc::new(AtomicBool::new(false));

        let reader = {
            let interest = interest.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                let frame = Frame::new("42").with_type("price");
                let mut misses = 0;
                while !stop.load(Ordering::Acquire) {
                    if !interest.wants(&frame) {
                        misses += 1;
                    }
                }
                misses
            })
        };

        for id in 1..=10_000 {
            assert!(interest.replace(SubscriptionId::new(id - 1), typed(id, "price")));
        }
        stop.store(true, Ordering::Release);

        assert_eq!(reader.join().unwrap(), 0);
        assert_eq!(interest.subscriptions(), vec![typed(10_000, "price")]);
    }
}
