//! Persistent result cache
//!
//! Producer results are stored as serialized [`CacheItem`]s grouped into
//! buckets, one bucket per query id. Items expire after the configured
//! lifetime (or their own lifetime) and are swept lazily from the request
//! path.
//!
//! # Drivers
//!
//! | Driver | Scope | Layout |
//! |--------|-------|--------|
//! | memory | client | nothing persisted |
//! | session | process | one JSON document per storage name |
//! | disk | machine | one JSON file per bucket |

pub mod driver;
pub mod item;
pub mod store;

pub use driver::{
    create_driver, DiskDriver, KeyValueDriver, MemoryDriver, SessionDriver, SessionStorage,
};
pub use item::{CacheItem, Store};
pub use store::CacheStore;
