//! query-client - async data-fetching cache
//!
//! Wraps asynchronous producers with a TTL-governed result cache, tracks the
//! request state of every query and publishes state changes to subscribers.

pub mod action;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod key;
pub mod query;
pub mod ui;

pub use client::{Client, Query, Subscription};
pub use config::{CacheConfig, Config, QueryOptions, StorageKind};
pub use error::{BoxError, ClientError, ClientResult};
pub use event::{DataPayload, ListenerId};
pub use key::QueryKey;
pub use query::{Producer, QueryEntry, RequestState};
