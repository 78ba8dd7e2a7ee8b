//! Reconciliation of placement events into execution triggers
//!
//! Every placement event (`CreateQuery`, `UpdateQuery`, `BulkUpdateQuery`)
//! yields one [`Trigger`] per entry that is still current. Each trigger is
//! also announced on the lifecycle bus as `FireUpdate` or
//! `FireUpdateBackground`.

use crate::event::{QueryEvent, QueryEventBus};
use crate::query::{QueryEntry, QueryRegistry};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Request to execute one query entry
///
/// Only the reconciler creates triggers, so every trigger corresponds to a
/// placement the registry has accepted.
#[derive(Debug, Clone)]
pub struct Trigger<A, R> {
    entry: QueryEntry<A, R>,
    refetch: bool,
    background: bool,
}

impl<A, R> Trigger<A, R> {
    pub fn entry(&self) -> &QueryEntry<A, R> {
        &self.entry
    }

    /// Whether the cache must be bypassed
    pub fn is_refetch(&self) -> bool {
        self.refetch
    }

    /// Whether only the terminal state is reported
    pub fn is_background(&self) -> bool {
        self.background
    }

    pub fn into_entry(self) -> QueryEntry<A, R> {
        self.entry
    }
}

/// Turns placement events into triggers
pub struct Reconciler<A, R> {
    registry: Arc<QueryRegistry<A, R>>,
    events: Arc<QueryEventBus<A, R>>,
}

impl<A, R> Reconciler<A, R>
where
    A: Serialize + Clone,
    R: Clone,
{
    pub fn new(registry: Arc<QueryRegistry<A, R>>, events: Arc<QueryEventBus<A, R>>) -> Self {
        Self { registry, events }
    }

    /// Reconcile a placement event
    ///
    /// Bucket events and fire events produce no triggers.
    pub fn reconcile(&self, event: &QueryEvent<A, R>) -> Vec<Trigger<A, R>> {
        match event {
            QueryEvent::CreateQuery {
                entry,
                refetch,
                background,
            }
            | QueryEvent::UpdateQuery {
                entry,
                refetch,
                background,
            } => self.fire(std::slice::from_ref(entry), *refetch, *background),
            QueryEvent::BulkUpdateQuery {
                entries,
                refetch,
                background,
            } => self.fire(entries, *refetch, *background),
            QueryEvent::CreateBucket { .. }
            | QueryEvent::UpdateBucket { .. }
            | QueryEvent::FireUpdate { .. }
            | QueryEvent::FireUpdateBackground { .. } => Vec::new(),
        }
    }

    fn fire(
        &self,
        entries: &[QueryEntry<A, R>],
        refetch: bool,
        background: bool,
    ) -> Vec<Trigger<A, R>> {
        let mut triggers = Vec::with_capacity(entries.len());

        for entry in entries {
            if !self.registry.reassert(entry) {
                debug!(
                    query = %entry.id,
                    args = %entry.signature,
                    "Placement superseded before reconcile, skipping"
                );
                continue;
            }

            let event = if background {
                QueryEvent::FireUpdateBackground {
                    entry: entry.clone(),
                    refetch,
                }
            } else {
                QueryEvent::FireUpdate {
                    entry: entry.clone(),
                    refetch,
                }
            };
            self.events.publish(&event);

            triggers.push(Trigger {
                entry: entry.clone(),
                refetch,
                background,
            });
        }

        triggers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::event::QueryEventKind;
    use crate::key::QueryKey;
    use crate::query::Producer;
    use std::sync::Mutex;

    type Entry = QueryEntry<(i64,), i64>;

    fn entry(id: &str, n: i64) -> Entry {
        let producer: Arc<dyn Producer<(i64,), i64>> =
            Arc::new(|_args: Option<(i64,)>| async { Ok::<_, BoxError>(0) });
        QueryEntry::new(QueryKey::with_args(id, (n,)), producer).unwrap()
    }

    fn setup() -> (
        Arc<QueryRegistry<(i64,), i64>>,
        Reconciler<(i64,), i64>,
        Arc<Mutex<Vec<QueryEventKind>>>,
    ) {
        let events = Arc::new(QueryEventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in [
            QueryEventKind::FireUpdate,
            QueryEventKind::FireUpdateBackground,
        ] {
            let seen = Arc::clone(&seen);
            events.subscribe(kind, move |e: &QueryEvent<(i64,), i64>| {
                seen.lock().unwrap().push(e.kind())
            });
        }
        let registry = Arc::new(QueryRegistry::new(Arc::clone(&events)));
        let reconciler = Reconciler::new(Arc::clone(&registry), events);
        (registry, reconciler, seen)
    }

    #[test]
    fn foreground_fetch_fires_update() {
        let (registry, reconciler, seen) = setup();
        let event = registry.fetch(entry("double", 21));

        let triggers = reconciler.reconcile(&event);
        assert_eq!(triggers.len(), 1);
        assert!(!triggers[0].is_background());
        assert!(!triggers[0].is_refetch());
        assert_eq!(*seen.lock().unwrap(), vec![QueryEventKind::FireUpdate]);
    }

    #[test]
    fn background_refetch_fires_background_update() {
        let (registry, reconciler, seen) = setup();
        let event = registry.refetch(entry("double", 21), true);

        let triggers = reconciler.reconcile(&event);
        assert!(triggers[0].is_background());
        assert!(triggers[0].is_refetch());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![QueryEventKind::FireUpdateBackground]
        );
    }

    #[test]
    fn bulk_event_yields_one_trigger_per_entry() {
        let (registry, reconciler, _) = setup();
        let event = registry.fetch_many(vec![entry("a", 1), entry("b", 2), entry("a", 3)]);

        let triggers = reconciler.reconcile(&event);
        let ids: Vec<_> = triggers.iter().map(|t| t.entry().id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "a"]);
    }

    #[test]
    fn superseded_placement_is_skipped() {
        let (registry, reconciler, seen) = setup();
        let stale = registry.fetch(entry("double", 21));
        registry.refetch(entry("double", 21), false);

        assert!(reconciler.reconcile(&stale).is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn bucket_events_yield_nothing() {
        let (_, reconciler, _) = setup();
        let event = QueryEvent::CreateBucket {
            id: "double".to_string(),
        };
        assert!(reconciler.reconcile(&event).is_empty());
    }
}
