//! Query client
//!
//! The client ties the pieces together. A fetch places an entry in the
//! registry, the reconciler turns the placement into triggers, and each
//! trigger is executed here:
//!
//! 1. foreground triggers publish `loading` then `fetching`
//! 2. [`Client::execute_query`] resolves the result from the cache store or
//!    the producer
//! 3. the terminal `success` / `error` state is published
//!
//! Background triggers skip step 1. Every published state is also written
//! into the registry entry, unless a newer placement of the same query has
//! superseded it; superseded results are still returned to their caller.

mod flight;
mod request;
mod subscription;

pub use request::Query;
pub use subscription::Subscription;

use crate::action::{Reconciler, Trigger};
use crate::cache::{create_driver, CacheItem, CacheStore, KeyValueDriver};
use crate::config::{Config, QueryOptions};
use crate::error::{ClientError, ClientResult};
use crate::event::{
    DataEventBus, DataPayload, ListenerId, QueryEvent, QueryEventBus, StoreEventBus,
};
use crate::key::QueryKey;
use crate::query::{Producer, QueryBuckets, QueryEntry, QueryRegistry, RequestState};
use flight::{Flight, Flights};
use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Caching client for asynchronous producers
///
/// Cloning is cheap; clones share the cache, registry and buses.
pub struct Client<A, R> {
    inner: Arc<ClientInner<A, R>>,
}

struct ClientInner<A, R> {
    config: RwLock<Config>,
    store: AsyncMutex<CacheStore>,
    registry: Arc<QueryRegistry<A, R>>,
    reconciler: Reconciler<A, R>,
    query_events: Arc<QueryEventBus<A, R>>,
    store_events: Arc<StoreEventBus>,
    data_events: Arc<DataEventBus<R>>,
    /// One lock per (id, signature) with a request in flight
    flights: Flights,
}

/// Unit of work derived from one placement
enum Job<A, R> {
    Fire(Trigger<A, R>),
    /// Superseded before reconcile, resolved without publishing
    Detached {
        entry: QueryEntry<A, R>,
        refetch: bool,
    },
    Rejected(ClientError),
}

impl<A, R> Clone for Client<A, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, R> Client<A, R>
where
    A: Serialize + Clone + Send + Sync + 'static,
    R: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create a client using the driver selected by the configuration
    pub async fn new(config: Config) -> Self {
        let driver = create_driver(&config.cache);
        Self::with_driver(config, driver).await
    }

    /// Create a client over an explicit storage driver
    pub async fn with_driver(config: Config, driver: Box<dyn KeyValueDriver>) -> Self {
        let store_events = Arc::new(StoreEventBus::new());
        let query_events = Arc::new(QueryEventBus::new());
        let data_events = Arc::new(DataEventBus::new());

        let store = CacheStore::open(
            driver,
            config.cache.lifetime(),
            Arc::clone(&store_events),
        )
        .await;
        let registry = Arc::new(QueryRegistry::new(Arc::clone(&query_events)));
        let reconciler = Reconciler::new(Arc::clone(&registry), Arc::clone(&query_events));

        info!(
            driver = store.driver_name(),
            available = store.is_available(),
            cache_results = config.cache.cache_results,
            "Query client ready"
        );

        Self {
            inner: Arc::new(ClientInner {
                config: RwLock::new(config),
                store: AsyncMutex::new(store),
                registry,
                reconciler,
                query_events,
                store_events,
                data_events,
                flights: Flights::default(),
            }),
        }
    }

    /// Fetch a query, served from the cache while the stored result is valid
    pub async fn fetch(
        &self,
        key: impl Into<QueryKey<A>>,
        producer: impl Producer<A, R> + 'static,
    ) -> ClientResult<R> {
        self.request(Query::new(key, producer), false, false).await
    }

    /// Fetch a query, always calling the producer
    pub async fn refetch(
        &self,
        key: impl Into<QueryKey<A>>,
        producer: impl Producer<A, R> + 'static,
    ) -> ClientResult<R> {
        self.request(Query::new(key, producer), true, false).await
    }

    /// Refetch without publishing `loading` / `fetching`
    pub async fn refetch_in_background(
        &self,
        key: impl Into<QueryKey<A>>,
        producer: impl Producer<A, R> + 'static,
    ) -> ClientResult<R> {
        self.request(Query::new(key, producer), true, true).await
    }

    /// Fetch a batch, results are returned in input order
    pub async fn fetch_many(&self, queries: Vec<Query<A, R>>) -> Vec<ClientResult<R>> {
        self.request_many(queries, false, false).await
    }

    /// Refetch a batch, results are returned in input order
    pub async fn refetch_many(&self, queries: Vec<Query<A, R>>) -> Vec<ClientResult<R>> {
        self.request_many(queries, true, false).await
    }

    /// Refetch a batch reporting only terminal states
    pub async fn refetch_many_in_background(
        &self,
        queries: Vec<Query<A, R>>,
    ) -> Vec<ClientResult<R>> {
        self.request_many(queries, true, true).await
    }

    /// Registry entry for a key
    pub fn get_entry(&self, key: &QueryKey<A>) -> Option<QueryEntry<A, R>> {
        self.inner.registry.get_entry(key)
    }

    /// Registry entries sharing a query id
    pub fn get_bucket(&self, id: &str) -> Option<Vec<QueryEntry<A, R>>> {
        self.inner.registry.get_bucket(id)
    }

    /// Overwrite the registry entries of a query id
    pub fn set_bucket(&self, id: &str, entries: Vec<QueryEntry<A, R>>) {
        self.inner.registry.set_bucket(id, entries);
    }

    /// Snapshot of the whole registry
    pub fn buckets(&self) -> QueryBuckets<A, R> {
        self.inner.registry.buckets()
    }

    /// Replace the whole registry, publishing `UpdateBucket` per id
    pub fn set_buckets(&self, buckets: QueryBuckets<A, R>) {
        self.inner.registry.set_buckets(buckets);
    }

    /// Forget every registry entry
    ///
    /// Cached results are kept; requests still in flight finish without
    /// publishing.
    pub fn reset(&self) {
        self.inner.registry.reset();
    }

    /// Listen to state changes published under an event id
    pub fn subscribe<F>(&self, event_id: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&DataPayload<R>) + Send + Sync + 'static,
    {
        self.inner.data_events.subscribe(event_id.into(), listener)
    }

    /// Listen to state changes of a key
    pub fn subscribe_key<F>(&self, key: &QueryKey<A>, listener: F) -> ClientResult<ListenerId>
    where
        F: Fn(&DataPayload<R>) + Send + Sync + 'static,
    {
        Ok(self.subscribe(key.event_id()?, listener))
    }

    /// Remove a listener, returns whether it was registered
    pub fn unsubscribe(&self, event_id: &str, id: ListenerId) -> bool {
        self.inner.data_events.unsubscribe(&event_id.to_string(), id)
    }

    /// Watch a query: listen, fetch on mount, refetch on an interval
    ///
    /// Must be called from within a tokio runtime. Work stops when the
    /// returned subscription is cancelled or dropped.
    pub fn watch<F>(
        &self,
        query: Query<A, R>,
        options: QueryOptions,
        listener: F,
    ) -> ClientResult<Subscription<R>>
    where
        F: Fn(&DataPayload<R>) + Send + Sync + 'static,
    {
        let event_id = query.key.event_id()?;
        let listener_id = self.subscribe(event_id.clone(), listener);
        let bus = Arc::clone(&self.inner.data_events);

        if !options.enabled {
            debug!(query = %query.key, "Query disabled, not fetching");
            bus.dispatch(&event_id, &DataPayload::state(RequestState::Idle));
            return Ok(Subscription::new(event_id, listener_id, bus, Vec::new()));
        }

        let mut tasks = Vec::new();

        if options.fetch_on_mount {
            let client = self.clone();
            let query = query.clone();
            tasks.push(tokio::spawn(async move {
                let key = query.key.to_string();
                if let Err(e) = client.request(query, false, false).await {
                    debug!(query = %key, error = %e, "Fetch on mount failed");
                }
            }));
        }

        if let Some(period) = options.refetch_interval.filter(|period| !period.is_zero()) {
            let client = self.clone();
            let background = options.background_refetch;
            tasks.push(tokio::spawn(async move {
                client.refetch_every(query, period, background).await;
            }));
        }

        Ok(Subscription::new(event_id, listener_id, bus, tasks))
    }

    /// Options inherited from the current configuration
    pub fn options(&self) -> QueryOptions {
        QueryOptions::from_config(&self.config())
    }

    /// Current configuration
    pub fn config(&self) -> Config {
        self.inner
            .config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the configuration
    ///
    /// The cache lifetime and `cache_results` apply immediately. The storage
    /// driver is fixed when the client is created.
    pub async fn reconfigure(&self, config: Config) {
        let previous = self.config();
        if previous.cache.storage != config.cache.storage
            || previous.cache.storage_name != config.cache.storage_name
        {
            warn!(
                storage = %config.cache.storage,
                "Storage changes only apply to new clients"
            );
        }

        self.inner
            .store
            .lock()
            .await
            .set_lifetime(config.cache.lifetime());

        *self
            .inner
            .config
            .write()
            .unwrap_or_else(|e| e.into_inner()) = config;
        debug!("Client reconfigured");
    }

    /// Lifecycle event bus
    pub fn events(&self) -> &QueryEventBus<A, R> {
        &self.inner.query_events
    }

    /// Cache item event bus
    pub fn store_events(&self) -> &StoreEventBus {
        &self.inner.store_events
    }

    /// Cached items of one bucket
    pub async fn cached_items(&self, id: &str) -> Vec<CacheItem> {
        let store = self.inner.store.lock().await;
        store.bucket(id).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Whether the storage driver is still usable
    pub async fn is_cache_available(&self) -> bool {
        self.inner.store.lock().await.is_available()
    }

    /// Resolve a query result from the cache or the producer
    ///
    /// Runs under a per-query lock, so concurrent requests for the same
    /// (id, signature) call the producer at most once unless forced.
    pub async fn execute_query(
        &self,
        entry: &QueryEntry<A, R>,
        force_refetch: bool,
    ) -> ClientResult<R> {
        let flight = Flight::take_off(&self.inner.flights, entry);
        let _held = flight.hold().await;
        self.resolve(entry, force_refetch).await
    }

    async fn request(
        &self,
        query: Query<A, R>,
        refetch: bool,
        background: bool,
    ) -> ClientResult<R> {
        let entry = QueryEntry::new(query.key, query.producer)?;
        let event = if refetch {
            self.inner.registry.refetch(entry, background)
        } else {
            self.inner.registry.fetch(entry)
        };

        let job = self
            .plan(&event, refetch)
            .into_iter()
            .next()
            .unwrap_or_else(|| Job::Rejected(ClientError::Internal("empty placement".into())));
        self.run(job).await
    }

    async fn request_many(
        &self,
        queries: Vec<Query<A, R>>,
        refetch: bool,
        background: bool,
    ) -> Vec<ClientResult<R>> {
        let mut slots = Vec::with_capacity(queries.len());
        let mut entries = Vec::new();

        for query in queries {
            match QueryEntry::new(query.key, query.producer) {
                Ok(entry) => {
                    entries.push(entry);
                    slots.push(None);
                }
                Err(e) => slots.push(Some(Job::Rejected(e))),
            }
        }

        let mut planned = if entries.is_empty() {
            Vec::new()
        } else {
            let event = if refetch {
                self.inner.registry.refetch_many(entries, background)
            } else {
                self.inner.registry.fetch_many(entries)
            };
            self.plan(&event, refetch)
        }
        .into_iter();

        let jobs: Vec<Job<A, R>> = slots
            .into_iter()
            .map(|slot| {
                slot.or_else(|| planned.next()).unwrap_or_else(|| {
                    Job::Rejected(ClientError::Internal("missing placement".into()))
                })
            })
            .collect();

        join_all(jobs.into_iter().map(|job| self.run(job))).await
    }

    /// Pair every placed entry with its trigger
    fn plan(&self, event: &QueryEvent<A, R>, refetch: bool) -> Vec<Job<A, R>> {
        let mut triggers = self.inner.reconciler.reconcile(event).into_iter().peekable();

        event
            .entries()
            .into_iter()
            .map(|entry| {
                match triggers.next_if(|t| t.entry().generation == entry.generation) {
                    Some(trigger) => Job::Fire(trigger),
                    None => Job::Detached {
                        entry: entry.clone(),
                        refetch,
                    },
                }
            })
            .collect()
    }

    async fn run(&self, job: Job<A, R>) -> ClientResult<R> {
        match job {
            Job::Fire(trigger) => self.fire(trigger).await,
            Job::Detached { entry, refetch } => {
                debug!(
                    query = %entry.id,
                    args = %entry.signature,
                    "Query superseded, result will not be published"
                );
                self.execute_query(&entry, refetch).await
            }
            Job::Rejected(err) => Err(err),
        }
    }

    async fn fire(&self, trigger: Trigger<A, R>) -> ClientResult<R> {
        let refetch = trigger.is_refetch();
        let background = trigger.is_background();
        let entry = trigger.into_entry();

        let mut pending = Pending {
            client: self,
            entry: &entry,
            armed: !background,
        };
        if !background {
            self.transition(&entry, RequestState::Loading, None, None);
            self.transition(&entry, RequestState::Fetching, None, None);
        }

        let result = self.execute_query(&entry, refetch).await;
        pending.settle();

        match result {
            Ok(data) => {
                self.transition(&entry, RequestState::Success, Some(data.clone()), None);
                Ok(data)
            }
            Err(err) => {
                let shared = Arc::new(err.snapshot());
                self.transition(&entry, RequestState::Error, None, Some(shared));
                Err(err)
            }
        }
    }

    /// Record a state on the entry and publish it, unless superseded
    fn transition(
        &self,
        entry: &QueryEntry<A, R>,
        state: RequestState,
        data: Option<R>,
        error: Option<Arc<ClientError>>,
    ) {
        let applied = self.inner.registry.apply(
            &entry.id,
            &entry.signature,
            entry.generation,
            |stored| {
                stored.state = state;
                stored.data = data.clone();
                stored.error = error.clone();
            },
        );

        if applied.is_none() {
            debug!(
                query = %entry.id,
                args = %entry.signature,
                state = %state,
                "Stale transition discarded"
            );
            return;
        }

        debug!(query = %entry.id, args = %entry.signature, state = %state, "Query transition");
        self.inner
            .data_events
            .dispatch(&entry.event_id, &DataPayload { state, data, error });
    }

    async fn resolve(&self, entry: &QueryEntry<A, R>, force_refetch: bool) -> ClientResult<R> {
        if !self.config().cache.cache_results {
            debug!(query = %entry.id, "Result caching disabled");
            return self.produce(entry).await;
        }

        let cached = {
            let mut store = self.inner.store.lock().await;
            if store.needs_sweep() {
                store.sweep().await;
            }
            store.select_bucket(&entry.id).await;

            let lifetime = store.lifetime();
            store.get(&entry.signature).map(|item| {
                let valid = item.is_valid(lifetime);
                (item, valid)
            })
        };

        if let Some((item, true)) = &cached {
            if !force_refetch {
                match item.decode::<R>() {
                    Ok(data) => {
                        debug!(query = %entry.id, args = %entry.signature, "Cache hit");
                        return Ok(data);
                    }
                    Err(e) => warn!(query = %entry.id, error = %e, "Unreadable cached result"),
                }
            }
        }

        debug!(
            query = %entry.id,
            args = %entry.signature,
            forced = force_refetch,
            "Cache miss, calling producer"
        );
        let data = self.produce(entry).await?;

        match CacheItem::encode(&entry.signature, &data) {
            Ok(item) => {
                let mut store = self.inner.store.lock().await;
                store.select_bucket(&entry.id).await;
                if cached.is_some() {
                    store.replace(item).await;
                } else {
                    store.put(item).await;
                }
            }
            Err(e) => warn!(query = %entry.id, error = %e, "Result not cached"),
        }

        Ok(data)
    }

    async fn produce(&self, entry: &QueryEntry<A, R>) -> ClientResult<R> {
        entry
            .producer
            .produce(entry.args.clone())
            .await
            .map_err(|e| {
                debug!(query = %entry.id, error = %e, "Producer failed");
                ClientError::producer(&entry.id, &*e)
            })
    }

    async fn refetch_every(&self, query: Query<A, R>, period: Duration, background: bool) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = self.request(query.clone(), true, background).await {
                debug!(query = %query.key, error = %e, "Interval refetch failed");
            }
        }
    }

}

/// Resets a foreground request to `idle` if it is dropped before settling
struct Pending<'a, A, R>
where
    A: Serialize + Clone + Send + Sync + 'static,
    R: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    client: &'a Client<A, R>,
    entry: &'a QueryEntry<A, R>,
    armed: bool,
}

impl<A, R> Pending<'_, A, R>
where
    A: Serialize + Clone + Send + Sync + 'static,
    R: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn settle(&mut self) {
        self.armed = false;
    }
}

impl<A, R> Drop for Pending<'_, A, R>
where
    A: Serialize + Clone + Send + Sync + 'static,
    R: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.armed {
            debug!(query = %self.entry.id, args = %self.entry.signature, "Request cancelled");
            self.client.transition(self.entry, RequestState::Idle, None, None);
        }
    }
}
