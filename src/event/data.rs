//! Per-query data events
//!
//! Every state transition of a query is published under the query key's
//! event id. Subscribers register with that same id.

use crate::error::ClientError;
use crate::event::EventBus;
use crate::query::RequestState;
use std::sync::Arc;

/// State snapshot delivered to data subscribers
#[derive(Debug, Clone)]
pub struct DataPayload<R> {
    pub state: RequestState,
    pub data: Option<R>,
    pub error: Option<Arc<ClientError>>,
}

impl<R> DataPayload<R> {
    /// Payload for a non-terminal state
    pub fn state(state: RequestState) -> Self {
        Self {
            state,
            data: None,
            error: None,
        }
    }
}

/// Bus carrying data payloads keyed by event id
pub type DataEventBus<R> = EventBus<String, DataPayload<R>>;
