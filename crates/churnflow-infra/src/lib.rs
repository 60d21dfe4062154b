//! Infrastructure layer for Churnflow.
//!
//! Implements the storage ports defined in `churnflow-core::store` with
//! local filesystem backends that emulate the production object store
//! (bucketed blobs) and keyed store (one JSON value per key), plus
//! `config.toml` loading for the storage configuration.

pub mod config;
pub mod keyed_store;
pub mod object_store;

pub use config::{load_storage_config, StorageConfig};
pub use keyed_store::FsKeyedStore;
pub use object_store::FsObjectStore;
