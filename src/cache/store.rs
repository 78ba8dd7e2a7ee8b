//! TTL-governed bucket store
//!
//! Holds every bucket in memory and mirrors each change into a
//! [`KeyValueDriver`]. When the driver fails the store degrades to a no-op:
//! every read misses and every write is dropped, so callers always fall back
//! to running the producer.

use crate::cache::driver::KeyValueDriver;
use crate::cache::item::{CacheItem, Store};
use crate::error::ClientError;
use crate::event::{StoreEvent, StoreEventBus, StoreEventKind};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bucketed result cache with lazy TTL sweeping
pub struct CacheStore {
    driver: Box<dyn KeyValueDriver>,
    buckets: Store,
    active: Option<String>,
    lifetime: Duration,
    last_sweep: DateTime<Utc>,
    available: bool,
    failure: Option<String>,
    events: Arc<StoreEventBus>,
}

impl CacheStore {
    /// Open a store over a driver, loading persisted buckets
    pub async fn open(
        driver: Box<dyn KeyValueDriver>,
        lifetime: Duration,
        events: Arc<StoreEventBus>,
    ) -> Self {
        let mut store = Self {
            driver,
            buckets: Store::new(),
            active: None,
            lifetime,
            last_sweep: Utc::now(),
            available: true,
            failure: None,
            events,
        };

        match store.driver.init().await {
            Ok(buckets) => {
                info!(
                    driver = store.driver.name(),
                    buckets = buckets.len(),
                    "Cache store opened"
                );
                store.buckets = buckets;
            }
            Err(e) => store.degrade(e),
        }

        store
    }

    /// Whether the driver is still usable
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Why the store degraded, if it did
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Name of the backing driver
    pub fn driver_name(&self) -> &'static str {
        self.driver.name()
    }

    /// Default lifetime of items
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Change the default lifetime
    pub fn set_lifetime(&mut self, lifetime: Duration) {
        self.lifetime = lifetime;
    }

    /// Currently selected bucket
    pub fn active_bucket(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// True once more than one lifetime has passed since the last sweep
    pub fn needs_sweep(&self) -> bool {
        let elapsed = Utc::now().signed_duration_since(self.last_sweep);
        elapsed
            .to_std()
            .map(|elapsed| elapsed > self.lifetime)
            .unwrap_or(false)
    }

    /// Activate a bucket, creating and persisting it when absent
    pub async fn select_bucket(&mut self, id: &str) {
        self.active = Some(id.to_string());

        if !self.available || self.buckets.contains_key(id) {
            return;
        }

        self.buckets.insert(id.to_string(), Vec::new());
        debug!("Created cache bucket {}", id);
        self.persist_bucket(id).await;
    }

    /// Look up an item of the active bucket by args signature
    pub fn get(&self, id: &str) -> Option<CacheItem> {
        self.active_items()?.iter().find(|item| item.id == id).cloned()
    }

    /// Every item of the active bucket
    pub fn get_all(&self) -> Vec<CacheItem> {
        self.active_items().map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Items of a named bucket
    pub fn bucket(&self, id: &str) -> Option<&[CacheItem]> {
        if !self.available {
            return None;
        }
        self.buckets.get(id).map(Vec::as_slice)
    }

    /// Names of every bucket
    pub fn list_buckets(&self) -> Vec<String> {
        if !self.available {
            return vec![];
        }
        self.buckets.keys().cloned().collect()
    }

    /// Insert a new item into the active bucket
    pub async fn put(&mut self, item: CacheItem) {
        let Some(bucket) = self.writable_bucket() else {
            return;
        };

        self.buckets
            .entry(bucket.clone())
            .or_default()
            .push(item.clone());
        self.persist_bucket(&bucket).await;
        self.publish(StoreEventKind::ItemCreated, bucket, item);
    }

    /// Replace the item with the same id, or insert it
    pub async fn replace(&mut self, item: CacheItem) {
        let Some(bucket) = self.writable_bucket() else {
            return;
        };

        let items = self.buckets.entry(bucket.clone()).or_default();
        items.retain(|existing| existing.id != item.id);
        items.push(item.clone());
        self.persist_bucket(&bucket).await;
        self.publish(StoreEventKind::ItemUpdated, bucket, item);
    }

    /// Delete an item of the active bucket, returns whether one was removed
    pub async fn remove(&mut self, id: &str) -> bool {
        let Some(bucket) = self.writable_bucket() else {
            return false;
        };

        let items = self.buckets.entry(bucket.clone()).or_default();
        let Some(position) = items.iter().position(|item| item.id == id) else {
            return false;
        };
        let removed = items.remove(position);

        self.persist_bucket(&bucket).await;
        self.publish(StoreEventKind::ItemRemoved, bucket, removed);
        true
    }

    /// Drop expired items from every bucket using the store lifetime
    pub async fn sweep(&mut self) -> usize {
        self.sweep_with(self.lifetime).await
    }

    /// Drop items failing `now < date + (item lifetime ?? lifetime)`
    ///
    /// Returns how many items were removed.
    pub async fn sweep_with(&mut self, lifetime: Duration) -> usize {
        let now = Utc::now();
        self.last_sweep = now;

        if !self.available {
            return 0;
        }

        let mut removed = 0;
        for items in self.buckets.values_mut() {
            let before = items.len();
            items.retain(|item| item.is_valid_at(now, lifetime));
            removed += before - items.len();
        }

        self.persist_all().await;
        info!(removed, buckets = self.buckets.len(), "Cache swept");
        removed
    }

    /// Remove every bucket
    pub async fn clear(&mut self) -> usize {
        let count = self.buckets.len();
        self.buckets.clear();
        self.active = None;
        if self.available {
            self.persist_all().await;
        }
        count
    }

    fn active_items(&self) -> Option<&[CacheItem]> {
        if !self.available {
            return None;
        }
        let active = self.active.as_ref()?;
        self.buckets.get(active).map(Vec::as_slice)
    }

    fn writable_bucket(&self) -> Option<String> {
        if !self.available {
            debug!("Cache store unavailable, dropping write");
            return None;
        }
        if self.active.is_none() {
            warn!("Cache write without a selected bucket dropped");
        }
        self.active.clone()
    }

    fn publish(&self, kind: StoreEventKind, bucket: String, item: CacheItem) {
        if !self.available {
            return;
        }
        self.events.publish(StoreEvent { kind, bucket, item });
    }

    async fn persist_bucket(&mut self, bucket: &str) {
        let items = self.buckets.get(bucket).map(Vec::as_slice).unwrap_or(&[]);
        let result = self
            .driver
            .persist_bucket(bucket, items, &self.buckets)
            .await;
        if let Err(e) = result {
            self.degrade(e);
        }
    }

    async fn persist_all(&mut self) {
        let result = self.driver.persist(&self.buckets).await;
        if let Err(e) = result {
            self.degrade(e);
        }
    }

    fn degrade(&mut self, err: ClientError) {
        warn!(
            driver = self.driver.name(),
            error = %err,
            "Cache storage unavailable, continuing without cache"
        );
        self.available = false;
        self.failure = Some(err.to_string());
        self.buckets.clear();
    }
}
