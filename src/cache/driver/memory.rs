//! Ephemeral driver

use crate::cache::driver::KeyValueDriver;
use crate::cache::item::Store;
use crate::error::ClientResult;
use async_trait::async_trait;

/// Driver that persists nothing; buckets live only in the store's memory
#[derive(Debug, Default)]
pub struct MemoryDriver;

impl MemoryDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl KeyValueDriver for MemoryDriver {
    async fn init(&self) -> ClientResult<Store> {
        Ok(Store::new())
    }

    async fn persist(&self, _store: &Store) -> ClientResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
