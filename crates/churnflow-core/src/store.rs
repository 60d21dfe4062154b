//! Storage ports the infrastructure layer implements.
//!
//! The pipelines treat durable storage as two external collaborators: an
//! object store holding opaque blobs under path-like keys (CSV tables,
//! serialized models) and a keyed store holding one JSON value per key
//! (scored rows). Both traits are dyn-compatible via boxed futures so
//! step bodies can hold them as `Arc<dyn ObjectStore>`.

use futures_util::future::BoxFuture;

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Blob storage under path-like keys (e.g. `raw/training.csv`,
/// `artifact/model.json`, `predictions/predictions.csv`).
pub trait ObjectStore: Send + Sync {
    /// Fetch the blob stored under `key`.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StoreError>>;

    /// Store `bytes` under `key`, replacing any previous blob (idempotent,
    /// last-write-wins).
    fn put<'a>(&'a self, key: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// Keyed JSON storage, one value per unique stable key
/// (e.g. `prediction:<row_index>`).
pub trait KeyedStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: serde_json::Value,
    ) -> BoxFuture<'a, Result<(), StoreError>>;
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors from the storage collaborators.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No blob exists under the requested key.
    #[error("key not found: '{0}'")]
    NotFound(String),

    /// The key is empty, absolute, or escapes the bucket root.
    #[error("invalid key: '{0}'")]
    InvalidKey(String),

    /// Underlying IO failure.
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be encoded for storage.
    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}
