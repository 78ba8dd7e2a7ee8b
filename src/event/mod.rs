//! Publish/subscribe channels
//!
//! Three independent buses are owned by each client:
//!
//! | Bus | Topic | Payload |
//! |-----|-------|---------|
//! | [`StoreEventBus`] | [`StoreEventKind`] | [`StoreEvent`] |
//! | [`QueryEventBus`] | [`QueryEventKind`] | [`QueryEvent`] |
//! | [`DataEventBus`] | event id of a query key | [`DataPayload`] |
//!
//! Listeners are invoked synchronously, in subscription order, on the task
//! that dispatches.

pub mod data;
pub mod query;
pub mod store;

pub use data::{DataEventBus, DataPayload};
pub use query::{QueryEvent, QueryEventBus, QueryEventKind};
pub use store::{StoreEvent, StoreEventBus, StoreEventKind};

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use tracing::trace;
use uuid::Uuid;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback registered on a bus
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Topic-keyed listener table
pub struct EventBus<T, E> {
    listeners: RwLock<HashMap<T, Vec<(ListenerId, Listener<E>)>>>,
}

impl<T, E> EventBus<T, E>
where
    T: Eq + Hash + Clone + fmt::Debug,
{
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Register a listener for a topic
    pub fn subscribe<F>(&self, topic: T, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(topic)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener, returns whether it was registered
    pub fn unsubscribe(&self, topic: &T, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let Some(entries) = listeners.get_mut(topic) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|(listener_id, _)| *listener_id != id);
        let removed = entries.len() != before;

        if entries.is_empty() {
            listeners.remove(topic);
        }
        removed
    }

    /// Invoke every listener of a topic, returns how many were called
    ///
    /// The listener list is snapshotted first, so listeners may subscribe or
    /// unsubscribe from inside a callback.
    pub fn dispatch(&self, topic: &T, event: &E) -> usize {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
            .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        for listener in &snapshot {
            listener(event);
        }

        trace!(topic = ?topic, listeners = snapshot.len(), "Event dispatched");
        snapshot.len()
    }

    /// Number of listeners registered for a topic
    pub fn listener_count(&self, topic: &T) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
            .map_or(0, Vec::len)
    }
}

impl<T, E> Default for EventBus<T, E>
where
    T: Eq + Hash + Clone + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn dispatch_reaches_topic_listeners_only() {
        let bus: EventBus<String, u32> = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.subscribe("a".to_string(), move |v| sink.lock().unwrap().push(*v));

        assert_eq!(bus.dispatch(&"a".to_string(), &1), 1);
        assert_eq!(bus.dispatch(&"b".to_string(), &2), 0);

        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn unsubscribe_removes_listener() {
        let bus: EventBus<&'static str, ()> = EventBus::new();
        let id = bus.subscribe("topic", |_| {});
        let other = bus.subscribe("topic", |_| {});

        assert_eq!(bus.listener_count(&"topic"), 2);
        assert!(bus.unsubscribe(&"topic", id));
        assert!(!bus.unsubscribe(&"topic", id));
        assert_eq!(bus.listener_count(&"topic"), 1);

        assert!(bus.unsubscribe(&"topic", other));
        assert_eq!(bus.listener_count(&"topic"), 0);
    }

    #[test]
    fn listeners_run_in_subscription_order() {
        let bus: EventBus<u8, ()> = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = Arc::clone(&order);
            bus.subscribe(0, move |_| order.lock().unwrap().push(n));
        }
        bus.dispatch(&0, &());

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn listener_may_unsubscribe_itself() {
        let bus: Arc<EventBus<u8, ()>> = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let inner_bus = Arc::clone(&bus);
        let inner_slot = Arc::clone(&slot);
        let id = bus.subscribe(1, move |_| {
            if let Some(id) = *inner_slot.lock().unwrap() {
                inner_bus.unsubscribe(&1, id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        assert_eq!(bus.dispatch(&1, &()), 1);
        assert_eq!(bus.listener_count(&1), 0);
    }
}
