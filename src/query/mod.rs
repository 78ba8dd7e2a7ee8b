//! Query entries and their registry

pub mod entry;
pub mod registry;

pub use entry::{Producer, QueryEntry, RequestState};
pub use registry::{QueryBuckets, QueryRegistry};
