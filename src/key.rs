//! Query identity
//!
//! A query is identified by a name and, optionally, the argument tuple its
//! producer is called with. The name selects the bucket; the serialized
//! arguments select the entry inside it.

use crate::error::{ClientError, ClientResult};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Signature used for keys without arguments
pub const NO_ARGS_SIGNATURE: &str = "null";

/// Identity of a cached asynchronous call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKey<A> {
    /// A bare name, producer takes no arguments
    Name(String),
    /// A name plus the producer's argument tuple
    WithArgs(String, A),
}

impl<A> QueryKey<A> {
    /// Key without arguments
    pub fn name(id: impl Into<String>) -> Self {
        Self::Name(id.into())
    }

    /// Key with an argument tuple
    pub fn with_args(id: impl Into<String>, args: A) -> Self {
        Self::WithArgs(id.into(), args)
    }

    /// Rebuild a key from a derived id and derived args
    pub fn from_parts(id: impl Into<String>, args: Option<A>) -> Self {
        match args {
            Some(args) => Self::WithArgs(id.into(), args),
            None => Self::Name(id.into()),
        }
    }
}

impl<A: Serialize> QueryKey<A> {
    /// Serialized argument tuple, `"null"` when there are none
    pub fn signature(&self) -> ClientResult<String> {
        args_signature(derive_args(self))
    }

    /// Id under which state changes for this key are published
    ///
    /// Bare names publish under the name itself. Keys with arguments publish
    /// under the name followed by a sha256 of the `[name, args]` encoding.
    pub fn event_id(&self) -> ClientResult<String> {
        match self {
            Self::Name(id) => Ok(id.clone()),
            Self::WithArgs(id, args) => {
                let encoded = serde_json::to_vec(&(id, args))
                    .map_err(|e| ClientError::serialization(format!("key '{}'", id), e))?;
                let digest = Sha256::digest(&encoded);
                Ok(format!("{}#{}", id, hex::encode(digest)))
            }
        }
    }
}

impl<A> fmt::Display for QueryKey<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(derive_id(self))
    }
}

impl<A> From<&str> for QueryKey<A> {
    fn from(id: &str) -> Self {
        Self::Name(id.to_string())
    }
}

impl<A> From<String> for QueryKey<A> {
    fn from(id: String) -> Self {
        Self::Name(id)
    }
}

impl<A> From<(&str, A)> for QueryKey<A> {
    fn from((id, args): (&str, A)) -> Self {
        Self::WithArgs(id.to_string(), args)
    }
}

/// Name of the query (bucket id)
pub fn derive_id<A>(key: &QueryKey<A>) -> &str {
    match key {
        QueryKey::Name(id) | QueryKey::WithArgs(id, _) => id,
    }
}

/// Argument tuple of the query, if any
pub fn derive_args<A>(key: &QueryKey<A>) -> Option<&A> {
    match key {
        QueryKey::Name(_) => None,
        QueryKey::WithArgs(_, args) => Some(args),
    }
}

/// Serialize optional args into the signature stored on cache items
pub fn args_signature<A: Serialize>(args: Option<&A>) -> ClientResult<String> {
    match args {
        None => Ok(NO_ARGS_SIGNATURE.to_string()),
        Some(args) => {
            serde_json::to_string(args).map_err(|e| ClientError::serialization("query args", e))
        }
    }
}
