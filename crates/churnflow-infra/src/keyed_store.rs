//! Filesystem-backed keyed JSON store.
//!
//! One JSON file per key under `{data_dir}/{bucket}/kv/`, emulating the
//! production key-value sink. Keys may contain `:` separators (e.g.
//! `prediction:42`); the separator is mapped to a filename-safe character.

use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::debug;

use churnflow_core::store::{KeyedStore, StoreError};

use crate::config::StorageConfig;

pub struct FsKeyedStore {
    root: PathBuf,
}

impl FsKeyedStore {
    /// Create a store rooted at `{data_dir}/{config.bucket}/kv`.
    pub fn new(data_dir: &Path, config: &StorageConfig) -> Self {
        Self {
            root: data_dir.join(&config.bucket).join("kv"),
        }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty()
            || key
                .chars()
                .any(|c| !(c.is_ascii_alphanumeric() || matches!(c, ':' | '-' | '_' | '.')))
        {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let filename = key.replace(':', "__");
        Ok(self.root.join(format!("{filename}.json")))
    }
}

impl KeyedStore for FsKeyedStore {
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: serde_json::Value,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            let path = self.resolve(key)?;
            tokio::fs::create_dir_all(&self.root).await?;
            let bytes = serde_json::to_vec(&value)?;
            tokio::fs::write(&path, bytes).await?;
            debug!(key, "keyed value written");
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> FsKeyedStore {
        FsKeyedStore::new(tmp.path(), &StorageConfig::default())
    }

    #[tokio::test]
    async fn set_writes_one_file_per_key() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store
            .set("prediction:0", json!({"Prediction": "churned"}))
            .await
            .unwrap();
        store
            .set("prediction:1", json!({"Prediction": "no churned"}))
            .await
            .unwrap();

        let path = tmp.path().join("batch/kv/prediction__0.json");
        let text = std::fs::read_to_string(path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["Prediction"], json!("churned"));
    }

    #[tokio::test]
    async fn set_is_last_write_wins() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.set("prediction:0", json!({"v": 1})).await.unwrap();
        store.set("prediction:0", json!({"v": 2})).await.unwrap();

        let text =
            std::fs::read_to_string(tmp.path().join("batch/kv/prediction__0.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["v"], json!(2));
    }

    #[tokio::test]
    async fn hostile_keys_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        for key in ["", "a/b", "../x", "sp ace"] {
            let err = store.set(key, json!(null)).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidKey(_)), "key {key:?}");
        }
    }
}
