//! Cache item events

use crate::cache::CacheItem;
use crate::event::EventBus;

/// Kind of change applied to a cache item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreEventKind {
    ItemCreated,
    ItemUpdated,
    ItemRemoved,
}

/// A change to one item of one bucket
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub kind: StoreEventKind,
    pub bucket: String,
    pub item: CacheItem,
}

/// Bus carrying cache item events
pub type StoreEventBus = EventBus<StoreEventKind, StoreEvent>;

impl StoreEventBus {
    /// Publish a store event under its kind
    pub fn publish(&self, event: StoreEvent) -> usize {
        self.dispatch(&event.kind, &event)
    }
}
