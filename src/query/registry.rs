//! Query registry
//!
//! Authoritative table of query entries, bucketed by query id. At most one
//! entry exists per (id, args signature): placing an entry with a known
//! identity replaces the previous one (last writer wins, no field merge).

use crate::event::{QueryEvent, QueryEventBus};
use crate::key::{derive_id, QueryKey};
use crate::query::entry::QueryEntry;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Buckets of entries by query id
pub type QueryBuckets<A, R> = BTreeMap<String, Vec<QueryEntry<A, R>>>;

/// In-memory table of query entries
pub struct QueryRegistry<A, R> {
    buckets: Mutex<QueryBuckets<A, R>>,
    generation: AtomicU64,
    events: Arc<QueryEventBus<A, R>>,
}

impl<A, R> QueryRegistry<A, R>
where
    A: Serialize + Clone,
    R: Clone,
{
    /// Create an empty registry publishing on `events`
    pub fn new(events: Arc<QueryEventBus<A, R>>) -> Self {
        Self {
            buckets: Mutex::new(BTreeMap::new()),
            generation: AtomicU64::new(0),
            events,
        }
    }

    /// Register a first fetch, emits `CreateQuery` or `UpdateQuery`
    pub fn fetch(&self, entry: QueryEntry<A, R>) -> QueryEvent<A, R> {
        self.place_single(entry, false, false)
    }

    /// Register a refetch, always flagged `refetch`
    pub fn refetch(&self, entry: QueryEntry<A, R>, background: bool) -> QueryEvent<A, R> {
        self.place_single(entry, true, background)
    }

    /// Register a batch, emits exactly one `BulkUpdateQuery`
    pub fn fetch_many(&self, entries: Vec<QueryEntry<A, R>>) -> QueryEvent<A, R> {
        self.place_many(entries, false, false)
    }

    /// Register a batch of refetches, emits exactly one `BulkUpdateQuery`
    pub fn refetch_many(
        &self,
        entries: Vec<QueryEntry<A, R>>,
        background: bool,
    ) -> QueryEvent<A, R> {
        self.place_many(entries, true, background)
    }

    /// Look up the entry for a key
    pub fn get_entry(&self, key: &QueryKey<A>) -> Option<QueryEntry<A, R>> {
        let signature = key.signature().ok()?;
        self.lock()
            .get(derive_id(key))?
            .iter()
            .find(|entry| entry.signature == signature)
            .cloned()
    }

    /// Snapshot of one bucket
    pub fn get_bucket(&self, id: &str) -> Option<Vec<QueryEntry<A, R>>> {
        self.lock().get(id).cloned()
    }

    /// Snapshot of every bucket
    pub fn buckets(&self) -> QueryBuckets<A, R> {
        self.lock().clone()
    }

    /// Overwrite a bucket, emits `UpdateBucket`
    pub fn set_bucket(&self, id: &str, entries: Vec<QueryEntry<A, R>>) {
        let mut deduped: Vec<QueryEntry<A, R>> = Vec::with_capacity(entries.len());
        for entry in entries {
            replace_or_append(&mut deduped, entry);
        }

        self.lock().insert(id.to_string(), deduped.clone());
        self.events.publish(&QueryEvent::UpdateBucket {
            id: id.to_string(),
            entries: deduped,
        });
    }

    /// Replace the whole table, emits `UpdateBucket` per id
    pub fn set_buckets(&self, buckets: QueryBuckets<A, R>) {
        let mut table = QueryBuckets::new();
        for (id, entries) in buckets {
            let mut deduped: Vec<QueryEntry<A, R>> = Vec::with_capacity(entries.len());
            for entry in entries {
                replace_or_append(&mut deduped, entry);
            }
            table.insert(id, deduped);
        }

        *self.lock() = table.clone();
        debug!("Registry replaced ({} buckets)", table.len());

        for (id, entries) in table {
            self.events.publish(&QueryEvent::UpdateBucket { id, entries });
        }
    }

    /// Re-assert replace-or-append for an already placed entry
    ///
    /// Returns false when a newer placement of the same identity exists, in
    /// which case the registry is left untouched.
    pub fn reassert(&self, entry: &QueryEntry<A, R>) -> bool {
        let mut buckets = self.lock();
        let bucket = buckets.entry(entry.id.clone()).or_default();

        if let Some(existing) = bucket
            .iter()
            .find(|existing| existing.signature == entry.signature)
        {
            if existing.generation > entry.generation {
                return false;
            }
            if existing.generation == entry.generation {
                return true;
            }
        }

        replace_or_append(bucket, entry.clone());
        true
    }

    /// Mutate the stored entry if `generation` is still current
    ///
    /// Returns the updated snapshot, or `None` when the entry was superseded
    /// or removed.
    pub fn apply<F>(
        &self,
        id: &str,
        signature: &str,
        generation: u64,
        update: F,
    ) -> Option<QueryEntry<A, R>>
    where
        F: FnOnce(&mut QueryEntry<A, R>),
    {
        let mut buckets = self.lock();
        let entry = buckets
            .get_mut(id)?
            .iter_mut()
            .find(|entry| entry.signature == signature && entry.generation == generation)?;

        update(entry);
        entry.updated_at = Utc::now();
        Some(entry.clone())
    }

    /// Number of entries across all buckets
    pub fn len(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    /// Whether no entry is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    pub fn reset(&self) {
        self.lock().clear();
        debug!("Registry reset");
    }

    fn place_single(
        &self,
        entry: QueryEntry<A, R>,
        refetch: bool,
        background: bool,
    ) -> QueryEvent<A, R> {
        let (entry, created) = self.place(entry);
        let event = if created {
            QueryEvent::CreateQuery {
                entry,
                refetch,
                background,
            }
        } else {
            QueryEvent::UpdateQuery {
                entry,
                refetch,
                background,
            }
        };

        self.events.publish(&event);
        event
    }

    fn place_many(
        &self,
        entries: Vec<QueryEntry<A, R>>,
        refetch: bool,
        background: bool,
    ) -> QueryEvent<A, R> {
        let entries = entries
            .into_iter()
            .map(|entry| self.place(entry).0)
            .collect();

        let event = QueryEvent::BulkUpdateQuery {
            entries,
            refetch,
            background,
        };
        self.events.publish(&event);
        event
    }

    /// Assign a generation and store the entry, returns (snapshot, created)
    fn place(&self, mut entry: QueryEntry<A, R>) -> (QueryEntry<A, R>, bool) {
        entry.generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let (created, new_bucket) = {
            let mut buckets = self.lock();
            let new_bucket = !buckets.contains_key(&entry.id);
            let bucket = buckets.entry(entry.id.clone()).or_default();
            (replace_or_append(bucket, entry.clone()), new_bucket)
        };

        if new_bucket {
            self.events.publish(&QueryEvent::CreateBucket {
                id: entry.id.clone(),
            });
        }

        debug!(
            query = %entry.id,
            args = %entry.signature,
            generation = entry.generation,
            created,
            "Query placed"
        );
        (entry, created)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueryBuckets<A, R>> {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Replace the entry with the same signature or append, returns true on append
fn replace_or_append<A, R>(bucket: &mut Vec<QueryEntry<A, R>>, entry: QueryEntry<A, R>) -> bool {
    match bucket
        .iter_mut()
        .find(|existing| existing.signature == entry.signature)
    {
        Some(existing) => {
            *existing = entry;
            false
        }
        None => {
            bucket.push(entry);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::event::QueryEventKind;
    use crate::query::entry::{Producer, RequestState};
    use std::sync::Mutex as StdMutex;

    type Entry = QueryEntry<(i64,), i64>;

    fn producer() -> Arc<dyn Producer<(i64,), i64>> {
        Arc::new(|_args: Option<(i64,)>| async { Ok::<_, BoxError>(0) })
    }

    fn entry(id: &str, n: i64) -> Entry {
        QueryEntry::new(QueryKey::with_args(id, (n,)), producer()).unwrap()
    }

    fn recording_registry() -> (
        QueryRegistry<(i64,), i64>,
        Arc<StdMutex<Vec<QueryEventKind>>>,
    ) {
        let events = Arc::new(QueryEventBus::new());
        let seen = Arc::new(StdMutex::new(Vec::new()));
        for kind in [
            QueryEventKind::CreateBucket,
            QueryEventKind::UpdateBucket,
            QueryEventKind::CreateQuery,
            QueryEventKind::UpdateQuery,
            QueryEventKind::BulkUpdateQuery,
        ] {
            let seen = Arc::clone(&seen);
            events.subscribe(kind, move |e: &QueryEvent<(i64,), i64>| {
                seen.lock().unwrap().push(e.kind())
            });
        }
        (QueryRegistry::new(events), seen)
    }

    #[test]
    fn fetch_creates_then_updates() {
        let (registry, seen) = recording_registry();

        let first = registry.fetch(entry("double", 21));
        assert_eq!(first.kind(), QueryEventKind::CreateQuery);

        let second = registry.fetch(entry("double", 21));
        assert_eq!(second.kind(), QueryEventKind::UpdateQuery);

        assert_eq!(registry.len(), 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                QueryEventKind::CreateBucket,
                QueryEventKind::CreateQuery,
                QueryEventKind::UpdateQuery,
            ]
        );
    }

    #[test]
    fn incoming_entry_replaces_existing() {
        let (registry, _) = recording_registry();
        let key = QueryKey::with_args("double", (21,));

        let mut stale = entry("double", 21);
        stale.state = RequestState::Success;
        stale.data = Some(42);
        registry.fetch(stale);
        registry.refetch(entry("double", 21), false);

        let stored = registry.get_entry(&key).unwrap();
        assert_eq!(stored.state, RequestState::Idle);
        assert!(stored.data.is_none());
        assert_eq!(registry.get_bucket("double").unwrap().len(), 1);
    }

    #[test]
    fn refetch_is_flagged() {
        let (registry, _) = recording_registry();
        let event = registry.refetch(entry("double", 1), true);

        match event {
            QueryEvent::CreateQuery {
                refetch, background, ..
            } => {
                assert!(refetch);
                assert!(background);
            }
            other => panic!("unexpected event {:?}", other.kind()),
        }
    }

    #[test]
    fn fetch_many_emits_one_bulk_event() {
        let (registry, seen) = recording_registry();

        let event = registry.fetch_many(vec![entry("a", 1), entry("b", 2)]);
        assert_eq!(event.kind(), QueryEventKind::BulkUpdateQuery);
        assert_eq!(event.entry_count(), 2);
        assert_eq!(registry.len(), 2);

        let seen = seen.lock().unwrap();
        let bulk = seen
            .iter()
            .filter(|k| **k == QueryEventKind::BulkUpdateQuery)
            .count();
        let single = seen
            .iter()
            .filter(|k| matches!(k, QueryEventKind::CreateQuery | QueryEventKind::UpdateQuery))
            .count();
        assert_eq!(bulk, 1);
        assert_eq!(single, 0);
    }

    #[test]
    fn distinct_args_share_a_bucket() {
        let (registry, _) = recording_registry();
        registry.fetch(entry("double", 1));
        registry.fetch(entry("double", 2));
        registry.fetch(entry("triple", 1));

        assert_eq!(registry.get_bucket("double").unwrap().len(), 2);
        assert_eq!(registry.get_bucket("triple").unwrap().len(), 1);
        assert!(registry
            .get_entry(&QueryKey::with_args("triple", (2,)))
            .is_none());
    }

    #[test]
    fn set_bucket_dedupes_and_publishes() {
        let (registry, seen) = recording_registry();
        registry.set_bucket("double", vec![entry("double", 1), entry("double", 1)]);

        assert_eq!(registry.get_bucket("double").unwrap().len(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![QueryEventKind::UpdateBucket]);
    }

    #[test]
    fn apply_ignores_superseded_generation() {
        let (registry, _) = recording_registry();
        let old = match registry.fetch(entry("double", 1)) {
            QueryEvent::CreateQuery { entry, .. } => entry,
            other => panic!("unexpected event {:?}", other.kind()),
        };
        registry.refetch(entry("double", 1), false);

        let current = registry.get_bucket("double").unwrap()[0].generation;
        assert!(current > old.generation);
        let applied = registry.apply("double", "[1]", old.generation, |e| {
            e.state = RequestState::Success
        });
        assert!(applied.is_none());
        assert!(!registry.reassert(&old));
    }

    #[test]
    fn reset_clears_everything() {
        let (registry, _) = recording_registry();
        registry.fetch(entry("double", 1));
        registry.reset();
        assert!(registry.is_empty());
    }

    #[test]
    fn set_buckets_replaces_table() {
        let (registry, seen) = recording_registry();
        registry.fetch(entry("stale", 1));
        seen.lock().unwrap().clear();

        let mut buckets = QueryBuckets::new();
        buckets.insert(
            "double".to_string(),
            vec![entry("double", 1), entry("double", 1), entry("double", 2)],
        );
        buckets.insert("triple".to_string(), vec![entry("triple", 1)]);
        registry.set_buckets(buckets);

        let snapshot = registry.buckets();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["double", "triple"]);
        assert_eq!(snapshot["double"].len(), 2);
        assert!(registry.get_bucket("stale").is_none());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![QueryEventKind::UpdateBucket, QueryEventKind::UpdateBucket]
        );
    }
}
