//! On-disk table driver
//!
//! Each bucket is stored as `<sha256(bucket)>.json` inside the storage
//! directory. The file carries the bucket name, so hashing only serves to
//! produce safe file names.

use crate::cache::driver::KeyValueDriver;
use crate::cache::item::{CacheItem, Store};
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Serialized form of one bucket file
#[derive(Debug, Serialize, Deserialize)]
struct BucketFile {
    bucket: String,
    items: Vec<CacheItem>,
}

/// Driver persisting one JSON file per bucket
#[derive(Debug, Clone)]
pub struct DiskDriver {
    dir: PathBuf,
}

impl DiskDriver {
    /// Create a driver rooted at `dir` (created on first write)
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Storage directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding a bucket
    pub fn bucket_path(&self, bucket: &str) -> PathBuf {
        let digest = Sha256::digest(bucket.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    async fn ensure_dir(&self) -> ClientResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| unavailable(format!("creating {}", self.dir.display()), e))
    }

    async fn write_bucket(&self, bucket: &str, items: &[CacheItem]) -> ClientResult<()> {
        let path = self.bucket_path(bucket);
        let file = BucketFile {
            bucket: bucket.to_string(),
            items: items.to_vec(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| ClientError::serialization(format!("bucket '{}'", bucket), e))?;

        // Write then rename so a crash never leaves a truncated bucket
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .map_err(|e| unavailable(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| unavailable(format!("renaming {}", tmp.display()), e))?;

        debug!("Persisted bucket {} ({} items)", bucket, items.len());
        Ok(())
    }

    async fn bucket_files(&self) -> ClientResult<Vec<PathBuf>> {
        let mut files = vec![];
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| unavailable(format!("reading {}", self.dir.display()), e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| unavailable("reading storage entry", e))?
        {
            let path = entry.path();
            if is_bucket_file(&path) {
                files.push(path);
            }
        }

        Ok(files)
    }
}

/// `<64 hex digits>.json`, the names produced by `bucket_path`
fn is_bucket_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
        && path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| stem.len() == 64 && stem.bytes().all(|b| b.is_ascii_hexdigit()))
}

fn unavailable(context: impl Into<String>, source: std::io::Error) -> ClientError {
    ClientError::storage_unavailable("disk", format!("{}: {}", context.into(), source))
}

#[async_trait]
impl KeyValueDriver for DiskDriver {
    async fn init(&self) -> ClientResult<Store> {
        let mut store = Store::new();

        if !self.dir.exists() {
            debug!("Storage directory {} does not exist yet", self.dir.display());
            return Ok(store);
        }

        for path in self.bucket_files().await? {
            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| unavailable(format!("reading {}", path.display()), e))?;

            match serde_json::from_str::<BucketFile>(&content) {
                Ok(file) => {
                    store.insert(file.bucket, file.items);
                }
                Err(e) => warn!("Skipping unreadable bucket file {}: {}", path.display(), e),
            }
        }

        Ok(store)
    }

    async fn persist(&self, store: &Store) -> ClientResult<()> {
        self.ensure_dir().await?;

        let mut keep = HashSet::new();
        for (bucket, items) in store {
            self.write_bucket(bucket, items).await?;
            keep.insert(self.bucket_path(bucket));
        }

        for path in self.bucket_files().await? {
            if keep.contains(&path) {
                continue;
            }

            // Unparsable files were never loaded into the store
            let readable = match fs::read_to_string(&path).await {
                Ok(content) => serde_json::from_str::<BucketFile>(&content).is_ok(),
                Err(_) => false,
            };
            if !readable {
                warn!("Keeping unreadable bucket file {}", path.display());
                continue;
            }

            fs::remove_file(&path)
                .await
                .map_err(|e| unavailable(format!("removing {}", path.display()), e))?;
            debug!("Removed bucket file {}", path.display());
        }

        Ok(())
    }

    async fn persist_bucket(
        &self,
        bucket: &str,
        items: &[CacheItem],
        _store: &Store,
    ) -> ClientResult<()> {
        self.ensure_dir().await?;
        self.write_bucket(bucket, items).await
    }

    fn name(&self) -> &'static str {
        "disk"
    }
}
