//! Session-scoped driver
//!
//! Buckets are written as one JSON document into a process-wide string map,
//! so a client re-created in the same process finds the previous results.
//! Nothing survives process exit.

use crate::cache::driver::KeyValueDriver;
use crate::cache::item::Store;
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::debug;

static GLOBAL_SESSION: OnceLock<SessionStorage> = OnceLock::new();

/// String key/value map shared by session drivers
#[derive(Debug, Clone, Default)]
pub struct SessionStorage {
    values: Arc<Mutex<HashMap<String, String>>>,
    disabled: Arc<AtomicBool>,
}

impl SessionStorage {
    /// Fresh storage, independent of the process-wide one
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage shared by every session driver in this process
    pub fn global() -> Self {
        GLOBAL_SESSION.get_or_init(SessionStorage::new).clone()
    }

    /// Read a value
    pub fn get_item(&self, key: &str) -> ClientResult<Option<String>> {
        self.check_available()?;
        Ok(self
            .values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    /// Write a value
    pub fn set_item(&self, key: &str, value: String) -> ClientResult<()> {
        self.check_available()?;
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
        Ok(())
    }

    /// Remove a value
    pub fn remove_item(&self, key: &str) -> ClientResult<()> {
        self.check_available()?;
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }

    /// Turn the storage off, every access then fails
    pub fn set_available(&self, available: bool) {
        self.disabled.store(!available, Ordering::SeqCst);
    }

    fn check_available(&self) -> ClientResult<()> {
        if self.disabled.load(Ordering::SeqCst) {
            return Err(ClientError::storage_unavailable(
                "session",
                "session storage is disabled",
            ));
        }
        Ok(())
    }
}

/// Driver persisting the bucket set under one session storage key
#[derive(Debug)]
pub struct SessionDriver {
    name: String,
    storage: SessionStorage,
}

impl SessionDriver {
    /// Driver over the process-wide session storage
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_storage(name, SessionStorage::global())
    }

    /// Driver over an explicit storage handle
    pub fn with_storage(name: impl Into<String>, storage: SessionStorage) -> Self {
        Self {
            name: name.into(),
            storage,
        }
    }
}

#[async_trait]
impl KeyValueDriver for SessionDriver {
    async fn init(&self) -> ClientResult<Store> {
        let Some(raw) = self.storage.get_item(&self.name)? else {
            debug!("No session store named {}", self.name);
            return Ok(Store::new());
        };

        serde_json::from_str(&raw).map_err(|e| ClientError::storage_unavailable("session", e))
    }

    async fn persist(&self, store: &Store) -> ClientResult<()> {
        let raw = serde_json::to_string(store)
            .map_err(|e| ClientError::serialization("session store", e))?;
        self.storage.set_item(&self.name, raw)
    }

    fn name(&self) -> &'static str {
        "session"
    }
}
