//! Watched queries
//!
//! A [`Subscription`] owns the listener registered by `Client::watch` and the
//! background tasks started for it (fetch on mount, interval refetch). Both
//! are torn down on `cancel` or when the subscription is dropped.

use crate::event::{DataEventBus, ListenerId};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle keeping a watched query alive
#[must_use = "dropping a subscription cancels it"]
pub struct Subscription<R> {
    event_id: String,
    listener: ListenerId,
    bus: Arc<DataEventBus<R>>,
    tasks: Vec<JoinHandle<()>>,
    active: bool,
}

impl<R> Subscription<R> {
    pub(crate) fn new(
        event_id: String,
        listener: ListenerId,
        bus: Arc<DataEventBus<R>>,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            event_id,
            listener,
            bus,
            tasks,
            active: true,
        }
    }

    /// Event id the listener is registered under
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn listener_id(&self) -> ListenerId {
        self.listener
    }

    /// Whether a mount fetch or interval refetch task is still running
    pub fn has_running_tasks(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    /// Stop refetching and remove the listener
    pub fn cancel(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.bus.unsubscribe(&self.event_id, self.listener);
        debug!(event_id = %self.event_id, "Subscription cancelled");
    }
}

impl<R> Drop for Subscription<R> {
    fn drop(&mut self) {
        self.teardown();
    }
}
