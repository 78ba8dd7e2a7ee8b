//! Configuration schema for the query client
//!
//! Configuration is stored at `~/.config/query-client/config.toml`.
//! Every field is optional and falls back to the defaults below.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_LIFETIME_MS: u64 = 30 * 60 * 1000;
const DEFAULT_REFETCH_INTERVAL_MS: u64 = 5 * 60 * 1000;
const DEFAULT_STORAGE_NAME: &str = "query-client";

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache store settings
    pub cache: CacheConfig,

    /// Refetch interval for watched queries in milliseconds (0 = disabled)
    pub refetch_interval_ms: u64,

    /// Refetch watched queries without loading/fetching transitions
    pub background_refetch: bool,

    /// Fetch as soon as a query is watched
    pub fetch_on_mount: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            refetch_interval_ms: DEFAULT_REFETCH_INTERVAL_MS,
            background_refetch: false,
            fetch_on_mount: true,
        }
    }
}

impl Config {
    /// Refetch interval, `None` when disabled
    pub fn refetch_interval(&self) -> Option<Duration> {
        match self.refetch_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Backing driver for the cache store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Ephemeral, lost with the client
    Memory,
    /// Process-scoped, shared by clients within one process
    Session,
    /// One JSON file per bucket on disk
    Disk,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Session => write!(f, "session"),
            Self::Disk => write!(f, "disk"),
        }
    }
}

/// Cache store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Store producer results at all
    pub cache_results: bool,

    /// Time-to-live of cached results in milliseconds
    pub lifetime_ms: u64,

    /// Driver used to persist buckets
    pub storage: StorageKind,

    /// Name of the persisted store
    pub storage_name: String,

    /// Base directory for the disk driver (defaults to the data dir)
    pub storage_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_results: true,
            lifetime_ms: DEFAULT_LIFETIME_MS,
            storage: StorageKind::Disk,
            storage_name: DEFAULT_STORAGE_NAME.to_string(),
            storage_dir: None,
        }
    }
}

impl CacheConfig {
    /// Lifetime as a duration
    pub fn lifetime(&self) -> Duration {
        Duration::from_millis(self.lifetime_ms)
    }

    /// In-memory configuration, nothing touches disk
    pub fn in_memory() -> Self {
        Self {
            storage: StorageKind::Memory,
            ..Self::default()
        }
    }
}

/// Per-watch options layered over the client configuration
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Disabled queries report `idle` and never fetch
    pub enabled: bool,
    pub refetch_interval: Option<Duration>,
    pub background_refetch: bool,
    pub fetch_on_mount: bool,
}

impl QueryOptions {
    /// Options inherited from the client configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: true,
            refetch_interval: config.refetch_interval(),
            background_refetch: config.background_refetch,
            fetch_on_mount: config.fetch_on_mount,
        }
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
