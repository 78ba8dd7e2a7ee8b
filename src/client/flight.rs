//! In-flight request tracking
//!
//! One async lock per (id, signature) with a request running. A [`Flight`]
//! holds a share of that lock and removes the map entry when the last share
//! is dropped, including when the request future is cancelled.

use crate::query::QueryEntry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

type FlightKey = (String, String);

/// Locks of the requests currently in flight
#[derive(Default)]
pub(super) struct Flights {
    locks: Mutex<HashMap<FlightKey, Arc<AsyncMutex<()>>>>,
}

impl Flights {
    fn locks(&self) -> std::sync::MutexGuard<'_, HashMap<FlightKey, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of identities with a request in flight
    pub(super) fn len(&self) -> usize {
        self.locks().len()
    }
}

/// Share of a per-query lock, released on drop
pub(super) struct Flight<'a> {
    flights: &'a Flights,
    key: FlightKey,
    lock: Option<Arc<AsyncMutex<()>>>,
}

impl<'a> Flight<'a> {
    pub(super) fn take_off<A, R>(flights: &'a Flights, entry: &QueryEntry<A, R>) -> Self {
        let key = (entry.id.clone(), entry.signature.clone());
        let lock = Arc::clone(flights.locks().entry(key.clone()).or_default());
        Self {
            flights,
            key,
            lock: Some(lock),
        }
    }

    /// Wait for earlier requests of the same identity to settle
    pub(super) async fn hold(&self) -> Option<MutexGuard<'_, ()>> {
        match &self.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let mut locks = self.flights.locks();
        drop(self.lock.take());

        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}
