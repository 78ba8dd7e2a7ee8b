//! Query entries and the producer contract

use crate::error::{BoxError, ClientError, ClientResult};
use crate::key::{derive_args, derive_id, QueryKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Request lifecycle of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Idle,
    Loading,
    Fetching,
    Success,
    Error,
    Invalidated,
}

impl RequestState {
    /// Whether the request has settled
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    /// Whether a producer call is in progress
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Loading | Self::Fetching)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Fetching => "fetching",
            Self::Success => "success",
            Self::Error => "error",
            Self::Invalidated => "invalidated",
        };
        f.write_str(name)
    }
}

/// Asynchronous function whose results are cached
///
/// Implemented for every `Fn(Option<A>) -> impl Future<Output = Result<R, E>>`,
/// so plain async closures can be used directly.
#[async_trait]
pub trait Producer<A, R>: Send + Sync {
    /// Produce a result for the given arguments
    async fn produce(&self, args: Option<A>) -> Result<R, BoxError>;
}

#[async_trait]
impl<A, R, E, F, Fut> Producer<A, R> for F
where
    A: Send + 'static,
    R: Send + 'static,
    E: Into<BoxError> + 'static,
    F: Fn(Option<A>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    async fn produce(&self, args: Option<A>) -> Result<R, BoxError> {
        (self)(args).await.map_err(Into::into)
    }
}

/// Registered query: identity, producer and latest observed state
pub struct QueryEntry<A, R> {
    /// Query name, the bucket this entry lives in
    pub id: String,
    pub args: Option<A>,
    /// Serialized args, identity within the bucket
    pub signature: String,
    /// Id under which state changes are published
    pub event_id: String,
    pub producer: Arc<dyn Producer<A, R>>,
    pub state: RequestState,
    pub data: Option<R>,
    pub error: Option<Arc<ClientError>>,
    /// Placement counter, newer placements supersede older ones
    pub generation: u64,
    pub updated_at: DateTime<Utc>,
}

impl<A, R> QueryEntry<A, R>
where
    A: Serialize + Clone,
{
    /// Create an idle entry for a key
    pub fn new(key: QueryKey<A>, producer: Arc<dyn Producer<A, R>>) -> ClientResult<Self> {
        let signature = key.signature()?;
        let event_id = key.event_id()?;
        let id = derive_id(&key).to_string();
        let args = derive_args(&key).cloned();

        Ok(Self {
            id,
            args,
            signature,
            event_id,
            producer,
            state: RequestState::Idle,
            data: None,
            error: None,
            generation: 0,
            updated_at: Utc::now(),
        })
    }

    /// Rebuild the key this entry was created from
    pub fn key(&self) -> QueryKey<A> {
        QueryKey::from_parts(self.id.clone(), self.args.clone())
    }

    /// Whether two entries denote the same query
    pub fn same_identity(&self, other: &Self) -> bool {
        self.id == other.id && self.signature == other.signature
    }
}

impl<A: Clone, R: Clone> Clone for QueryEntry<A, R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            args: self.args.clone(),
            signature: self.signature.clone(),
            event_id: self.event_id.clone(),
            producer: Arc::clone(&self.producer),
            state: self.state,
            data: self.data.clone(),
            error: self.error.clone(),
            generation: self.generation,
            updated_at: self.updated_at,
        }
    }
}

impl<A: fmt::Debug, R: fmt::Debug> fmt::Debug for QueryEntry<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEntry")
            .field("id", &self.id)
            .field("args", &self.args)
            .field("signature", &self.signature)
            .field("state", &self.state)
            .field("data", &self.data)
            .field("error", &self.error)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
