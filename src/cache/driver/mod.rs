//! Persistence drivers for the cache store
//!
//! The store keeps buckets in memory and mirrors every change into a driver.
//! Drivers only load and persist; all bucket logic lives in the store, so the
//! three implementations behave identically from the store's perspective.

pub mod disk;
pub mod memory;
pub mod session;

pub use disk::DiskDriver;
pub use memory::MemoryDriver;
pub use session::{SessionDriver, SessionStorage};

use crate::cache::item::{CacheItem, Store};
use crate::config::{CacheConfig, ConfigManager, StorageKind};
use crate::error::ClientResult;
use async_trait::async_trait;

/// Abstract persistence backend
///
/// Any method may fail with `StorageUnavailable`; the store degrades to a
/// no-op cache when that happens.
#[async_trait]
pub trait KeyValueDriver: Send + Sync {
    /// Load every persisted bucket
    async fn init(&self) -> ClientResult<Store>;

    /// Persist the full bucket set, replacing what was stored
    async fn persist(&self, store: &Store) -> ClientResult<()>;

    /// Persist one bucket
    ///
    /// `store` is the full set after the change, for drivers that can only
    /// write everything at once.
    async fn persist_bucket(
        &self,
        _bucket: &str,
        _items: &[CacheItem],
        store: &Store,
    ) -> ClientResult<()> {
        self.persist(store).await
    }

    /// Human-readable driver name for logs
    fn name(&self) -> &'static str;
}

/// Create the driver selected by the cache configuration
pub fn create_driver(config: &CacheConfig) -> Box<dyn KeyValueDriver> {
    match config.storage {
        StorageKind::Memory => Box::new(MemoryDriver::new()),
        StorageKind::Session => Box::new(SessionDriver::new(config.storage_name.clone())),
        StorageKind::Disk => Box::new(DiskDriver::new(ConfigManager::storage_path(config))),
    }
}
