//! Publish/subscribe registries for status events and signals.
//!
//! [`Subscribers`] maps a key to an ordered list of callbacks. Subscribing
//! returns a [`SubscriptionId`] which is the only way to unsubscribe;
//! closures have no identity of their own.

use crate::path::BusPath;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handle returned by [`Subscribers::subscribe`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SubscriptionId(u64);

type Callback<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// Keyed, ordered callback registry.
pub struct Subscribers<K, A> {
    next_id: AtomicU64,
    entries: DashMap<K, Vec<(SubscriptionId, Callback<A>)>>,
}

impl<K: Eq + Hash + Clone, A> Subscribers<K, A> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: DashMap::new(),
        }
    }

    pub fn subscribe<F>(&self, key: K, callback: F) -> SubscriptionId
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .entry(key)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, key: &K, id: SubscriptionId) -> bool {
        let Some(mut list) = self.entries.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|(entry, _)| *entry != id);
        let removed = list.len() != before;
        let empty = list.is_empty();
        drop(list);
        if empty {
            self.entries.remove_if(key, |_, list| list.is_empty());
        }
        removed
    }

    /// Invoke every callback registered for `key`, in subscription order.
    ///
    /// Callbacks run after the registry lock is released, so they may
    /// subscribe or unsubscribe. Returns the number of callbacks invoked.
    pub fn emit(&self, key: &K, arg: &A) -> usize {
        let callbacks: Vec<Callback<A>> = match self.entries.get(key) {
            Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return 0,
        };
        for callback in &callbacks {
            callback(arg);
        }
        callbacks.len()
    }

    pub fn count(&self, key: &K) -> usize {
        self.entries.get(key).map(|list| list.len()).unwrap_or(0)
    }
}

impl<K: Eq + Hash + Clone, A> Default for Subscribers<K, A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Keys for bus-level status subscriptions.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum EventKind {
    Connect,
    Disconnect,
    Reconnect,
    Error,
    Child,
}

/// Bus-level status notifications.
#[derive(Clone, PartialEq, Debug)]
pub enum BusEvent {
    /// The node is attached to the bus under `path`.
    Connect { path: BusPath },
    /// The parent link was lost.
    Disconnect,
    /// The parent link was re-established and names re-published.
    Reconnect { path: BusPath },
    /// A transport reported an error.
    Error { message: String },
    /// A child connection was accepted and assigned `path`.
    Child { path: BusPath },
}

impl BusEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::Connect { .. } => EventKind::Connect,
            BusEvent::Disconnect => EventKind::Disconnect,
            BusEvent::Reconnect { .. } => EventKind::Reconnect,
            BusEvent::Error { .. } => EventKind::Error,
            BusEvent::Child { .. } => EventKind::Child,
        }
    }
}

/// Status event registry shared by a node and its façade.
pub type StatusEvents = Subscribers<EventKind, BusEvent>;

/// Signal listener registry, keyed by signal name.
pub type SignalListeners = Subscribers<String, Vec<serde_json::Value>>;

/// Emit a status event to its subscribers.
pub fn publish(status: &StatusEvents, event: BusEvent) -> usize {
    status.emit(&event.kind(), &event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_in_subscription_order() {
        let registry: Subscribers<&'static str, u32> = Subscribers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            registry.subscribe("tick", move |n| seen.lock().unwrap().push(format!("{tag}{n}")));
        }

        assert_eq!(registry.emit(&"tick", &1), 3);
        assert_eq!(*seen.lock().unwrap(), vec!["a1", "b1", "c1"]);
        assert_eq!(registry.emit(&"other", &1), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let registry: Subscribers<&'static str, u32> = Subscribers::new();
        let first = registry.subscribe("tick", |_| {});
        let second = registry.subscribe("tick", |_| {});

        assert!(registry.unsubscribe(&"tick", first));
        assert!(!registry.unsubscribe(&"tick", first));
        assert_eq!(registry.count(&"tick"), 1);

        assert!(registry.unsubscribe(&"tick", second));
        assert_eq!(registry.count(&"tick"), 0);
        assert!(!registry.unsubscribe(&"missing", second));
    }

    #[test]
    fn test_callback_may_subscribe_during_emit() {
        let registry: Arc<Subscribers<&'static str, u32>> = Arc::new(Subscribers::new());
        let inner = Arc::clone(&registry);
        registry.subscribe("tick", move |_| {
            inner.subscribe("tock", |_| {});
        });

        registry.emit(&"tick", &0);
        assert_eq!(registry.count(&"tock"), 1);
    }

    #[test]
    fn test_publish_routes_by_kind() {
        let status = StatusEvents::new();
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        status.subscribe(EventKind::Disconnect, move |event| {
            assert_eq!(event, &BusEvent::Disconnect);
            *counter.lock().unwrap() += 1;
        });

        publish(&status, BusEvent::Disconnect);
        publish(&status, BusEvent::Connect { path: BusPath::root() });
        assert_eq!(*hits.lock().unwrap(), 1);
    }
}
