//! A key paired with the producer that resolves it

use crate::key::QueryKey;
use crate::query::Producer;
use std::fmt;
use std::sync::Arc;

/// Query request handed to the client
pub struct Query<A, R> {
    pub key: QueryKey<A>,
    pub producer: Arc<dyn Producer<A, R>>,
}

impl<A, R> Query<A, R> {
    /// Pair a key with a producer
    ///
    /// ```ignore
    /// let query = Query::new(("double", (21,)), |args: Option<(i64,)>| async move {
    ///     let (n,) = args.unwrap_or_default();
    ///     Ok::<_, BoxError>(n * 2)
    /// });
    /// ```
    pub fn new<P>(key: impl Into<QueryKey<A>>, producer: P) -> Self
    where
        P: Producer<A, R> + 'static,
    {
        Self {
            key: key.into(),
            producer: Arc::new(producer),
        }
    }

    /// Pair a key with an already shared producer
    pub fn shared(key: impl Into<QueryKey<A>>, producer: Arc<dyn Producer<A, R>>) -> Self {
        Self {
            key: key.into(),
            producer,
        }
    }
}

impl<A: Clone, R> Clone for Query<A, R> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            producer: Arc::clone(&self.producer),
        }
    }
}

impl<A: fmt::Debug, R> fmt::Debug for Query<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
