//! Error types for the query client
//!
//! All modules use `ClientResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for query client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Boxed error returned by producers
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All errors that can occur in the query client
#[derive(Error, Debug)]
pub enum ClientError {
    // Storage errors
    #[error("Storage driver '{driver}' is unavailable: {reason}")]
    StorageUnavailable { driver: String, reason: String },

    #[error("Cache bucket not found: {0}")]
    BucketNotFound(String),

    // Query errors
    #[error("Producer failed for query '{id}': {message}")]
    ProducerFailure { id: String, message: String },

    #[error("Failed to serialize {what}: {source}")]
    SerializationFailure {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Unknown config key: {0}")]
    UnknownConfigKey(String),

    #[error("Invalid value for {key}: {reason}")]
    ConfigValue { key: String, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("{0}")]
    Prompt(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a storage unavailable error
    pub fn storage_unavailable(driver: impl Into<String>, reason: impl ToString) -> Self {
        Self::StorageUnavailable {
            driver: driver.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a serialization failure for the named value
    pub fn serialization(what: impl Into<String>, source: serde_json::Error) -> Self {
        Self::SerializationFailure {
            what: what.into(),
            source,
        }
    }

    /// Create a producer failure from whatever the producer returned
    pub fn producer(id: impl Into<String>, err: &(dyn std::error::Error + 'static)) -> Self {
        Self::ProducerFailure {
            id: id.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error came from the producer rather than the engine
    pub fn is_producer_failure(&self) -> bool {
        matches!(self, Self::ProducerFailure { .. })
    }

    /// Copy handed to observers; sources that cannot be cloned are flattened to text
    pub fn snapshot(&self) -> Self {
        match self {
            Self::StorageUnavailable { driver, reason } => Self::StorageUnavailable {
                driver: driver.clone(),
                reason: reason.clone(),
            },
            Self::BucketNotFound(bucket) => Self::BucketNotFound(bucket.clone()),
            Self::ProducerFailure { id, message } => Self::ProducerFailure {
                id: id.clone(),
                message: message.clone(),
            },
            Self::Internal(message) => Self::Internal(message.clone()),
            other => Self::Internal(other.to_string()),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::StorageUnavailable { .. } => {
                Some("Check storage_dir permissions or switch cache.storage to \"memory\"")
            }
            Self::ConfigInvalid { .. } => Some("Run: query-client config show"),
            Self::BucketNotFound(_) => Some("Run: query-client cache list"),
            Self::UnknownConfigKey(_) => Some("Run: query-client config show"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ClientError::storage_unavailable("disk", "permission denied");
        assert_eq!(
            err.to_string(),
            "Storage driver 'disk' is unavailable: permission denied"
        );
    }

    #[test]
    fn error_hint() {
        let err = ClientError::BucketNotFound("users".to_string());
        assert_eq!(err.hint(), Some("Run: query-client cache list"));
        assert!(ClientError::Internal("x".to_string()).hint().is_none());
    }

    #[test]
    fn producer_failure_keeps_message() {
        let source = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
        let err = ClientError::producer("users", &source);
        assert!(err.is_producer_failure());
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn snapshot_preserves_producer_failure() {
        let source = std::io::Error::new(std::io::ErrorKind::Other, "timeout");
        let err = ClientError::producer("users", &source);
        assert_eq!(err.snapshot().to_string(), err.to_string());

        let io = ClientError::io("reading", source);
        assert!(matches!(io.snapshot(), ClientError::Internal(_)));
    }
}
