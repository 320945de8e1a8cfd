//! Handle-based observer registry.
//!
//! Effects subscribe to life-cycle events of any owner (or to heartbeats)
//! and receive an opaque [`SubscriptionHandle`]. Registering the same
//! (subscriber, topic) pair twice returns the existing handle, so `login`
//! can blindly re-subscribe. Unsubscribing is idempotent.
//!
//! Delivery order is subscription order: handles are allocated
//! monotonically and each topic keeps its subscribers sorted by handle.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::event::OwnerEventKind;
use crate::types::{EffectRef, Heartbeat, OwnerId};

/// Opaque token identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

/// What a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// One kind of life-cycle event raised by one owner.
    Owner {
        /// The owner raising the event.
        source: OwnerId,
        /// The event kind.
        kind: OwnerEventKind,
    },
    /// A world heartbeat.
    Heartbeat(Heartbeat),
}

/// Registry of live subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    next_handle: u64,
    by_handle: HashMap<SubscriptionHandle, (EffectRef, Topic)>,
    by_key: HashMap<(EffectRef, Topic), SubscriptionHandle>,
    by_topic: HashMap<Topic, BTreeMap<SubscriptionHandle, EffectRef>>,
    by_subscriber: HashMap<EffectRef, BTreeSet<SubscriptionHandle>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `subscriber` to `topic`, returning the existing handle if
    /// the pair is already registered.
    pub fn subscribe(&mut self, subscriber: EffectRef, topic: Topic) -> SubscriptionHandle {
        if let Some(&handle) = self.by_key.get(&(subscriber, topic)) {
            return handle;
        }
        self.next_handle += 1;
        let handle = SubscriptionHandle(self.next_handle);
        self.by_handle.insert(handle, (subscriber, topic));
        self.by_key.insert((subscriber, topic), handle);
        self.by_topic.entry(topic).or_default().insert(handle, subscriber);
        self.by_subscriber.entry(subscriber).or_default().insert(handle);
        handle
    }

    /// Release a subscription. Returns `false` if it was already released.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        let Some((subscriber, topic)) = self.by_handle.remove(&handle) else {
            return false;
        };
        self.by_key.remove(&(subscriber, topic));
        if let Some(subs) = self.by_topic.get_mut(&topic) {
            subs.remove(&handle);
            if subs.is_empty() {
                self.by_topic.remove(&topic);
            }
        }
        if let Some(handles) = self.by_subscriber.get_mut(&subscriber) {
            handles.remove(&handle);
            if handles.is_empty() {
                self.by_subscriber.remove(&subscriber);
            }
        }
        true
    }

    /// Whether `handle` is still live.
    #[must_use]
    pub fn is_active(&self, handle: SubscriptionHandle) -> bool {
        self.by_handle.contains_key(&handle)
    }

    /// Subscribers of `topic`, in subscription order.
    ///
    /// Returns an owned list so delivery can proceed while hooks add and
    /// remove subscriptions.
    #[must_use]
    pub fn subscribers(&self, topic: Topic) -> Vec<(SubscriptionHandle, EffectRef)> {
        self.by_topic
            .get(&topic)
            .map(|subs| subs.iter().map(|(&h, &r)| (h, r)).collect())
            .unwrap_or_default()
    }

    /// Number of live handles held by `subscriber`.
    #[must_use]
    pub fn held_by(&self, subscriber: EffectRef) -> usize {
        self.by_subscriber.get(&subscriber).map_or(0, BTreeSet::len)
    }

    /// Release every handle held by `subscriber`. Returns how many there were.
    pub fn release_subscriber(&mut self, subscriber: EffectRef) -> usize {
        let handles: Vec<_> = self
            .by_subscriber
            .get(&subscriber)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default();
        for handle in &handles {
            self.unsubscribe(*handle);
        }
        handles.len()
    }

    /// Release every subscription listening to events raised by `source`.
    /// Returns how many were released.
    pub fn release_source(&mut self, source: OwnerId) -> usize {
        let handles: Vec<_> = self
            .by_handle
            .iter()
            .filter(|(_, (_, topic))| {
                matches!(topic, Topic::Owner { source: s, .. } if *s == source)
            })
            .map(|(&h, _)| h)
            .collect();
        for handle in &handles {
            self.unsubscribe(*handle);
        }
        handles.len()
    }

    /// Total live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    /// Whether there are no live subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EffectId;

    fn effect_on(owner: u64) -> EffectRef {
        EffectRef::new(OwnerId(owner), EffectId::new())
    }

    fn died(source: u64) -> Topic {
        Topic::Owner {
            source: OwnerId(source),
            kind: OwnerEventKind::Died,
        }
    }

    #[test]
    fn duplicate_subscribe_returns_same_handle() {
        let mut reg = SubscriptionRegistry::new();
        let e = effect_on(1);
        let a = reg.subscribe(e, died(2));
        let b = reg.subscribe(e, died(2));
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let mut reg = SubscriptionRegistry::new();
        let h = reg.subscribe(effect_on(1), died(2));
        assert!(reg.unsubscribe(h));
        assert!(!reg.unsubscribe(h));
        assert!(reg.is_empty());
        assert!(reg.subscribers(died(2)).is_empty());
    }

    #[test]
    fn subscribers_in_subscription_order() {
        let mut reg = SubscriptionRegistry::new();
        let first = effect_on(5);
        let second = effect_on(3);
        let third = effect_on(9);
        reg.subscribe(first, died(1));
        reg.subscribe(second, died(1));
        reg.subscribe(third, died(1));
        let order: Vec<_> = reg.subscribers(died(1)).into_iter().map(|(_, r)| r).collect();
        assert_eq!(order, vec![first, second, third]);
    }

    #[test]
    fn release_subscriber_purges_all_topics() {
        let mut reg = SubscriptionRegistry::new();
        let e = effect_on(1);
        reg.subscribe(e, died(2));
        reg.subscribe(e, Topic::Heartbeat(Heartbeat::Minute));
        let other = reg.subscribe(effect_on(4), died(2));
        assert_eq!(reg.held_by(e), 2);
        assert_eq!(reg.release_subscriber(e), 2);
        assert_eq!(reg.held_by(e), 0);
        assert!(reg.is_active(other));
        assert_eq!(reg.release_subscriber(e), 0);
    }

    #[test]
    fn release_source_only_touches_that_source() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe(effect_on(1), died(2));
        reg.subscribe(
            effect_on(1),
            Topic::Owner {
                source: OwnerId(2),
                kind: OwnerEventKind::Moved,
            },
        );
        let keep = reg.subscribe(effect_on(1), died(3));
        assert_eq!(reg.release_source(OwnerId(2)), 2);
        assert!(reg.is_active(keep));
        assert_eq!(reg.len(), 1);
    }
}
