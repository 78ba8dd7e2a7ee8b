//! Query lifecycle events
//!
//! The registry publishes placement events, the reconciler turns them into
//! execution triggers (`FireUpdate` / `FireUpdateBackground`).

use crate::event::EventBus;
use crate::query::QueryEntry;

/// Topic of a lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryEventKind {
    CreateBucket,
    UpdateBucket,
    CreateQuery,
    UpdateQuery,
    BulkUpdateQuery,
    FireUpdate,
    FireUpdateBackground,
}

/// Lifecycle event carrying entry snapshots
#[derive(Debug, Clone)]
pub enum QueryEvent<A, R> {
    /// First entry placed under a new query id
    CreateBucket { id: String },
    /// A bucket was overwritten from outside
    UpdateBucket {
        id: String,
        entries: Vec<QueryEntry<A, R>>,
    },
    /// An entry was appended
    CreateQuery {
        entry: QueryEntry<A, R>,
        refetch: bool,
        background: bool,
    },
    /// An entry replaced an existing one
    UpdateQuery {
        entry: QueryEntry<A, R>,
        refetch: bool,
        background: bool,
    },
    /// A batch of entries was placed
    BulkUpdateQuery {
        entries: Vec<QueryEntry<A, R>>,
        refetch: bool,
        background: bool,
    },
    /// Execute with visible loading/fetching transitions
    FireUpdate {
        entry: QueryEntry<A, R>,
        refetch: bool,
    },
    /// Execute and report only the terminal state
    FireUpdateBackground {
        entry: QueryEntry<A, R>,
        refetch: bool,
    },
}

impl<A, R> QueryEvent<A, R> {
    /// Topic this event is published under
    pub fn kind(&self) -> QueryEventKind {
        match self {
            Self::CreateBucket { .. } => QueryEventKind::CreateBucket,
            Self::UpdateBucket { .. } => QueryEventKind::UpdateBucket,
            Self::CreateQuery { .. } => QueryEventKind::CreateQuery,
            Self::UpdateQuery { .. } => QueryEventKind::UpdateQuery,
            Self::BulkUpdateQuery { .. } => QueryEventKind::BulkUpdateQuery,
            Self::FireUpdate { .. } => QueryEventKind::FireUpdate,
            Self::FireUpdateBackground { .. } => QueryEventKind::FireUpdateBackground,
        }
    }

    /// Entries carried, in placement order
    pub fn entries(&self) -> Vec<&QueryEntry<A, R>> {
        match self {
            Self::CreateBucket { .. } => Vec::new(),
            Self::UpdateBucket { entries, .. } | Self::BulkUpdateQuery { entries, .. } => {
                entries.iter().collect()
            }
            Self::CreateQuery { entry, .. }
            | Self::UpdateQuery { entry, .. }
            | Self::FireUpdate { entry, .. }
            | Self::FireUpdateBackground { entry, .. } => vec![entry],
        }
    }

    /// Number of entries carried
    pub fn entry_count(&self) -> usize {
        match self {
            Self::CreateBucket { .. } => 0,
            Self::UpdateBucket { entries, .. } | Self::BulkUpdateQuery { entries, .. } => {
                entries.len()
            }
            Self::CreateQuery { .. }
            | Self::UpdateQuery { .. }
            | Self::FireUpdate { .. }
            | Self::FireUpdateBackground { .. } => 1,
        }
    }
}

/// Bus carrying lifecycle events
pub type QueryEventBus<A, R> = EventBus<QueryEventKind, QueryEvent<A, R>>;

impl<A, R> QueryEventBus<A, R> {
    /// Publish a lifecycle event under its kind
    pub fn publish(&self, event: &QueryEvent<A, R>) -> usize {
        self.dispatch(&event.kind(), event)
    }
}
