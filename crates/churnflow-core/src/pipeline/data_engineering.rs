//! Data engineering flow: `load-data -> process-data -> save-data`.
//!
//! Loads the raw training and testing CSVs, concatenates them, resamples
//! 80% of the unique customer ids into the train partition with a fixed
//! seed, cleans and one-hot-encodes, and writes the four model-ready
//! splits back to the object store.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::FutureExt;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::json;
use tracing::info;

use churnflow_types::table::Table;
use churnflow_types::workflow::{FlowDefinition, StepDefinition};

use crate::store::ObjectStore;
use crate::workflow::artifact::{ArtifactSet, ArtifactValue};
use crate::workflow::executor::{
    ExecutorError, FlowExecutor, FlowOutcome, StepContext, StepError, StepRegistry,
};

use super::{
    fetch_table, put_table, CATEGORICAL_COLUMNS, FEATURE_COLUMNS, ID_COLUMN, RAW_TESTING_KEY,
    RAW_TRAINING_KEY, TARGET_COLUMN, X_TEST_KEY, X_TRAIN_KEY, Y_TEST_KEY, Y_TRAIN_KEY,
};

pub const FLOW_NAME: &str = "data-engineering";

/// Fraction of unique customer ids assigned to the train partition.
const TRAIN_FRACTION: f64 = 0.8;

pub fn flow() -> FlowDefinition {
    FlowDefinition::new(
        FLOW_NAME,
        vec![
            StepDefinition::root("load-data", "Load Data"),
            StepDefinition::after("process-data", "Process Data", &["load-data"]),
            StepDefinition::after("save-data", "Save Data", &["process-data"]),
        ],
    )
}

pub fn registry(objects: Arc<dyn ObjectStore>, seed: u64) -> StepRegistry {
    let mut registry = StepRegistry::new();

    let store = Arc::clone(&objects);
    registry.register_fn("load-data", move |_ctx: StepContext| {
        let store = Arc::clone(&store);
        async move {
            let training = fetch_table(&store, RAW_TRAINING_KEY).await?;
            let testing = fetch_table(&store, RAW_TESTING_KEY).await?;
            let combined = training.vstack(&testing)?;
            info!(rows = combined.row_count(), "raw data loaded");

            let mut out = ArtifactSet::new();
            out.insert("data", ArtifactValue::Table(combined))?;
            Ok(out)
        }
        .boxed()
    });

    registry.register_fn("process-data", move |ctx: StepContext| {
        async move {
            let data = ctx.upstream_one()?.table("data")?;
            let (x_train, y_train, x_test, y_test) = process(data, seed)?;
            info!(
                train_rows = x_train.row_count(),
                test_rows = x_test.row_count(),
                "data processed"
            );

            let mut out = ArtifactSet::new();
            out.insert("x_train", ArtifactValue::Table(x_train))?;
            out.insert("y_train", ArtifactValue::Table(y_train))?;
            out.insert("x_test", ArtifactValue::Table(x_test))?;
            out.insert("y_test", ArtifactValue::Table(y_test))?;
            Ok(out)
        }
        .boxed()
    });

    let store = Arc::clone(&objects);
    registry.register_fn("save-data", move |ctx: StepContext| {
        let store = Arc::clone(&store);
        async move {
            let splits = ctx.upstream_one()?;
            for (name, key) in [
                ("x_train", X_TRAIN_KEY),
                ("y_train", Y_TRAIN_KEY),
                ("x_test", X_TEST_KEY),
                ("y_test", Y_TEST_KEY),
            ] {
                put_table(&store, key, splits.table(name)?).await?;
            }

            let mut out = ArtifactSet::new();
            out.insert(
                "summary",
                ArtifactValue::Json(json!({
                    "train_rows": splits.table("x_train")?.row_count(),
                    "test_rows": splits.table("x_test")?.row_count(),
                })),
            )?;
            Ok(out)
        }
        .boxed()
    });

    registry
}

pub async fn run(objects: Arc<dyn ObjectStore>, seed: u64) -> Result<FlowOutcome, ExecutorError> {
    let flow = flow();
    let registry = registry(objects, seed);
    FlowExecutor::execute(&flow, &registry, ArtifactSet::new()).await
}

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// Resample, clean, encode, and split the combined dataset.
///
/// One-hot encoding runs on the combined table before the split so both
/// partitions share one schema regardless of which categorical values the
/// draw puts where. Unique customer ids are then shuffled with the seeded
/// rng and the first 80% form the train partition; rows with nulls are
/// dropped from the train partition only.
fn process(data: &Table, seed: u64) -> Result<(Table, Table, Table, Table), StepError> {
    let encoded = data.one_hot_encode(&CATEGORICAL_COLUMNS)?;
    let id_idx = encoded.column_index(ID_COLUMN)?;

    let mut unique_ids: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for row in encoded.rows() {
        let id = row[id_idx].render();
        if seen.insert(id.clone()) {
            unique_ids.push(id);
        }
    }

    let drawn = resample_ids(&unique_ids, seed);
    let train_ids: HashSet<&str> = drawn.iter().map(|s| s.as_str()).collect();

    let train = encoded.filter_rows(|row| train_ids.contains(row[id_idx].render().as_str()));
    let test = encoded.filter_rows(|row| !train_ids.contains(row[id_idx].render().as_str()));

    let train = train.drop_null_rows();

    let (x_train, y_train) = split_xy(&train)?;
    let (x_test, y_test) = split_xy(&test)?;
    Ok((x_train, y_train, x_test, y_test))
}

fn split_xy(partition: &Table) -> Result<(Table, Table), StepError> {
    let x = partition.select(&FEATURE_COLUMNS)?;
    let y = partition.select(&[TARGET_COLUMN])?;
    Ok((x, y))
}

/// Deterministic 80% draw of unique ids.
pub fn resample_ids(ids: &[String], seed: u64) -> Vec<String> {
    let mut shuffled = ids.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);
    let train_count = (shuffled.len() as f64 * TRAIN_FRACTION).round() as usize;
    shuffled.truncate(train_count);
    shuffled
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testutil::MemoryObjectStore;
    use crate::pipeline::DEFAULT_RESAMPLE_SEED;
    use churnflow_types::workflow::RunStatus;

    /// Small raw dataset exercising every categorical value the feature
    /// list references.
    fn raw_csv(start_id: usize, rows: usize) -> String {
        let mut out = String::from(
            "CustomerID,Age,Gender,Support Calls,Payment Delay,Subscription Type,Contract Length,Total Spend,Last Interaction,Churn\n",
        );
        let genders = ["Male", "Female"];
        let subs = ["Basic", "Standard", "Premium"];
        let contracts = ["Monthly", "Annual", "Quarterly"];
        for i in 0..rows {
            let id = start_id + i;
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{}\n",
                id,
                20 + (i % 40),
                genders[i % 2],
                i % 10,
                i % 30,
                subs[i % 3],
                contracts[i % 3],
                100 + i * 10,
                i % 25,
                i % 2,
            ));
        }
        out
    }

    fn seeded_store() -> Arc<MemoryObjectStore> {
        let store = MemoryObjectStore::shared();
        store.seed(RAW_TRAINING_KEY, raw_csv(1, 40));
        store.seed(RAW_TESTING_KEY, raw_csv(100, 10));
        store
    }

    #[tokio::test]
    async fn flow_writes_all_four_splits() {
        let store = seeded_store();
        let outcome = run(store.clone(), DEFAULT_RESAMPLE_SEED).await.unwrap();
        assert_eq!(outcome.run.status, RunStatus::Succeeded);

        for key in [X_TRAIN_KEY, Y_TRAIN_KEY, X_TEST_KEY, Y_TEST_KEY] {
            assert!(store.bytes(key).is_some(), "missing {key}");
        }

        let x_train = Table::from_csv(&store.text(X_TRAIN_KEY).unwrap()).unwrap();
        assert_eq!(x_train.columns(), &FEATURE_COLUMNS);
        let y_train = Table::from_csv(&store.text(Y_TRAIN_KEY).unwrap()).unwrap();
        assert_eq!(y_train.columns(), &[TARGET_COLUMN]);
        assert_eq!(x_train.row_count(), y_train.row_count());
    }

    #[tokio::test]
    async fn split_is_deterministic_for_a_fixed_seed() {
        let a = seeded_store();
        let b = seeded_store();
        run(a.clone(), 42).await.unwrap();
        run(b.clone(), 42).await.unwrap();
        assert_eq!(a.bytes(X_TRAIN_KEY), b.bytes(X_TRAIN_KEY));
        assert_eq!(a.bytes(X_TEST_KEY), b.bytes(X_TEST_KEY));
    }

    #[tokio::test]
    async fn partitions_cover_all_rows_without_overlap() {
        let store = seeded_store();
        run(store.clone(), 42).await.unwrap();

        let x_train = Table::from_csv(&store.text(X_TRAIN_KEY).unwrap()).unwrap();
        let x_test = Table::from_csv(&store.text(X_TEST_KEY).unwrap()).unwrap();
        // 50 complete input rows, one per unique id; 80% of 50 = 40
        assert_eq!(x_train.row_count(), 40);
        assert_eq!(x_test.row_count(), 10);
    }

    #[tokio::test]
    async fn null_rows_dropped_from_train_partition_only() {
        let store = MemoryObjectStore::shared();
        // every row is null-damaged in Age
        let mut damaged = String::from(
            "CustomerID,Age,Gender,Support Calls,Payment Delay,Subscription Type,Contract Length,Total Spend,Last Interaction,Churn\n",
        );
        for i in 0..10 {
            damaged.push_str(&format!(
                "{},,{},1,1,Basic,{},100,1,0\n",
                i,
                if i % 2 == 0 { "Male" } else { "Female" },
                ["Monthly", "Annual"][i % 2],
            ));
        }
        store.seed(RAW_TRAINING_KEY, damaged);
        store.seed(RAW_TESTING_KEY, raw_csv(100, 4));

        run(store.clone(), 42).await.unwrap();
        let x_train = Table::from_csv(&store.text(X_TRAIN_KEY).unwrap()).unwrap();
        let x_test = Table::from_csv(&store.text(X_TEST_KEY).unwrap()).unwrap();
        // 14 ids, 11 in train. At most 4 complete rows can survive the
        // null drop in train; the 3-row test partition keeps its nulls.
        assert!((1..=4).contains(&x_train.row_count()));
        assert_eq!(x_test.row_count(), 3);
    }

    #[test]
    fn resample_ids_is_stable() {
        let ids: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        let a = resample_ids(&ids, 42);
        let b = resample_ids(&ids, 42);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        let c = resample_ids(&ids, 7);
        assert_eq!(c.len(), 8);
    }

    #[tokio::test]
    async fn missing_raw_blob_fails_the_run() {
        let store = MemoryObjectStore::shared();
        store.seed(RAW_TRAINING_KEY, raw_csv(1, 5));
        // no testing.csv
        let err = run(store, 42).await.unwrap_err();
        let ExecutorError::StepFailed { step_id, run, .. } = err else {
            panic!("expected a step failure");
        };
        assert_eq!(step_id, "load-data");
        assert_eq!(run.status, RunStatus::Failed);
    }
}
