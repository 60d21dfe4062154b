//! Filesystem-backed object store.
//!
//! Emulates a bucketed blob store: each key maps to a file at
//! `{data_dir}/{bucket}/{key}`, with parent directories created on
//! demand. Writes go to a temp file in the destination directory and are
//! renamed into place so readers never observe a half-written blob.

use std::path::{Component, Path, PathBuf};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::debug;

use churnflow_core::store::{ObjectStore, StoreError};

use crate::config::StorageConfig;

pub struct FsObjectStore {
    root: PathBuf,
    config: StorageConfig,
}

impl FsObjectStore {
    /// Create a store rooted at `{data_dir}/{config.bucket}`.
    pub fn new(data_dir: &Path, config: StorageConfig) -> Self {
        Self {
            root: data_dir.join(&config.bucket),
            config,
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Resolve a key to its on-disk path, rejecting keys that are empty,
    /// absolute, or escape the bucket root.
    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let relative = Path::new(key);
        let safe = relative.components().all(|c| matches!(c, Component::Normal(_)));
        if relative.is_absolute() || !safe {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for FsObjectStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StoreError>> {
        async move {
            let path = self.resolve(key)?;
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    debug!(key, bytes = bytes.len(), "blob read");
                    Ok(bytes)
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    Err(StoreError::NotFound(key.to_string()))
                }
                Err(err) => Err(StoreError::Io(err)),
            }
        }
        .boxed()
    }

    fn put<'a>(&'a self, key: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            let path = self.resolve(key)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            // Temp file in the same directory so the rename stays on one
            // filesystem.
            let tmp = path.with_extension("tmp-write");
            tokio::fs::write(&tmp, &bytes).await?;
            tokio::fs::rename(&tmp, &path).await?;
            debug!(key, bytes = bytes.len(), "blob written");
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> FsObjectStore {
        FsObjectStore::new(tmp.path(), StorageConfig::default())
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.put("raw/training.csv", b"a,b\n1,2\n".to_vec()).await.unwrap();
        let bytes = store.get("raw/training.csv").await.unwrap();
        assert_eq!(bytes, b"a,b\n1,2\n");

        // blobs live under the configured bucket
        assert!(tmp.path().join("batch/raw/training.csv").exists());
    }

    #[tokio::test]
    async fn put_overwrites_idempotently() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.put("data/x.csv", b"old".to_vec()).await.unwrap();
        store.put("data/x.csv", b"new".to_vec()).await.unwrap();
        assert_eq!(store.get("data/x.csv").await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = store(&tmp).get("nope.csv").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn escaping_keys_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        for key in ["", "../escape.csv", "/absolute.csv", "a/../../b.csv"] {
            let err = store.put(key, b"x".to_vec()).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidKey(_)), "key {key:?}");
        }
    }
}
