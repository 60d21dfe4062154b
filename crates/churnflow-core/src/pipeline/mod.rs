//! The three churn pipelines: data engineering, model training, and
//! batch scoring.
//!
//! Each pipeline is a `FlowDefinition` plus a `StepRegistry` of bodies
//! wired to the storage ports. The flows never hand data to each other in
//! process; all cross-flow handoff goes through the object store under
//! the keys defined here.

use std::collections::BTreeMap;
use std::sync::Arc;

use churnflow_types::table::Table;

use crate::store::{ObjectStore, StoreError};
use crate::workflow::executor::StepError;

pub mod data_engineering;
pub mod scoring;
pub mod training;

// ---------------------------------------------------------------------------
// Storage keys
// ---------------------------------------------------------------------------

pub const RAW_TRAINING_KEY: &str = "raw/training.csv";
pub const RAW_TESTING_KEY: &str = "raw/testing.csv";
pub const X_TRAIN_KEY: &str = "data/X_train.csv";
pub const Y_TRAIN_KEY: &str = "data/y_train.csv";
pub const X_TEST_KEY: &str = "data/X_test.csv";
pub const Y_TEST_KEY: &str = "data/y_test.csv";
pub const MODEL_KEY: &str = "artifact/model.json";
pub const PREDICTIONS_KEY: &str = "predictions/predictions.csv";

// ---------------------------------------------------------------------------
// Dataset schema
// ---------------------------------------------------------------------------

/// Customer identity column; drives the train/test resample.
pub const ID_COLUMN: &str = "CustomerID";

/// Binary churn target (0 = retained, 1 = churned).
pub const TARGET_COLUMN: &str = "Churn";

/// Categorical columns replaced by one-hot indicators.
pub const CATEGORICAL_COLUMNS: [&str; 3] = ["Gender", "Subscription Type", "Contract Length"];

/// The fixed feature list every model is fit and scored on, in order.
pub const FEATURE_COLUMNS: [&str; 8] = [
    "Age",
    "Support Calls",
    "Payment Delay",
    "Total Spend",
    "Last Interaction",
    "Gender_Female",
    "Contract Length_Annual",
    "Contract Length_Monthly",
];

pub const DEFAULT_RESAMPLE_SEED: u64 = 42;
pub const DEFAULT_TRIAL_BUDGET: usize = 10;
pub const CV_FOLDS: usize = 5;

/// Class id to semantic label, as the scored output reports it.
pub fn default_label_map() -> BTreeMap<i64, String> {
    BTreeMap::from([(0, "no churned".to_string()), (1, "churned".to_string())])
}

// ---------------------------------------------------------------------------
// Shared step helpers
// ---------------------------------------------------------------------------

/// Fetch a CSV blob and parse it into a table.
pub(crate) async fn fetch_table(
    objects: &Arc<dyn ObjectStore>,
    key: &str,
) -> Result<Table, StepError> {
    let bytes = objects.get(key).await?;
    let text = String::from_utf8(bytes)
        .map_err(|e| StepError::Other(format!("blob '{key}' is not utf-8: {e}")))?;
    Ok(Table::from_csv(&text)?)
}

/// Serialize a table to CSV and store it.
pub(crate) async fn put_table(
    objects: &Arc<dyn ObjectStore>,
    key: &str,
    table: &Table,
) -> Result<(), StoreError> {
    objects.put(key, table.to_csv().into_bytes()).await
}

// ---------------------------------------------------------------------------
// In-memory stores for pipeline tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use dashmap::DashMap;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use serde_json::Value;

    use crate::store::{KeyedStore, ObjectStore, StoreError};

    #[derive(Default)]
    pub struct MemoryObjectStore {
        blobs: DashMap<String, Vec<u8>>,
    }

    impl MemoryObjectStore {
        pub fn shared() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn seed(&self, key: &str, bytes: impl Into<Vec<u8>>) {
            self.blobs.insert(key.to_string(), bytes.into());
        }

        pub fn bytes(&self, key: &str) -> Option<Vec<u8>> {
            self.blobs.get(key).map(|b| b.clone())
        }

        pub fn text(&self, key: &str) -> Option<String> {
            self.bytes(key).map(|b| String::from_utf8(b).unwrap())
        }
    }

    impl ObjectStore for MemoryObjectStore {
        fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StoreError>> {
            async move {
                self.blobs
                    .get(key)
                    .map(|b| b.clone())
                    .ok_or_else(|| StoreError::NotFound(key.to_string()))
            }
            .boxed()
        }

        fn put<'a>(
            &'a self,
            key: &'a str,
            bytes: Vec<u8>,
        ) -> BoxFuture<'a, Result<(), StoreError>> {
            async move {
                self.blobs.insert(key.to_string(), bytes);
                Ok(())
            }
            .boxed()
        }
    }

    #[derive(Default)]
    pub struct MemoryKeyedStore {
        pub values: DashMap<String, Value>,
    }

    impl MemoryKeyedStore {
        pub fn shared() -> Arc<Self> {
            Arc::new(Self::default())
        }
    }

    impl KeyedStore for MemoryKeyedStore {
        fn set<'a>(
            &'a self,
            key: &'a str,
            value: Value,
        ) -> BoxFuture<'a, Result<(), StoreError>> {
            async move {
                self.values.insert(key.to_string(), value);
                Ok(())
            }
            .boxed()
        }
    }
}
