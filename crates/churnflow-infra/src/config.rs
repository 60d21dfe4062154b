//! Storage configuration loader.
//!
//! Reads `config.toml` from the data directory and deserializes it into
//! [`StorageConfig`]. Falls back to the local-development defaults when
//! the file is missing or malformed.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Connection settings for the object store backend.
///
/// The filesystem backend only uses `bucket`; endpoint and credentials
/// are carried so a networked backend can be swapped in without touching
/// the pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            access_key: "minio".to_string(),
            secret_key: "minio123".to_string(),
            bucket: "batch".to_string(),
        }
    }
}

/// Load storage configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`StorageConfig::default()`].
/// - If the file exists but fails to read or parse, logs a warning and
///   returns the default.
pub async fn load_storage_config(data_dir: &Path) -> StorageConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return StorageConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return StorageConfig::default();
        }
    };

    match toml::from_str::<StorageConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            StorageConfig::default()
        }
    }
}
