//! Batch scoring flow: `start -> {load-data, load-model} -> batch-score
//! -> save-predictions`.
//!
//! The only fan-out/fan-in flow: data and model load concurrently, the
//! join resolves them through the merge policy, and the scored table goes
//! to both the object store (one CSV) and the keyed store (one JSON entry
//! per row).

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::json;
use tracing::info;

use churnflow_types::table::{Cell, Table, TableError};
use churnflow_types::workflow::{FlowDefinition, StepDefinition};

use crate::model::tree::DecisionTree;
use crate::model::{Classifier, ModelError};
use crate::store::{KeyedStore, ObjectStore};
use crate::workflow::artifact::{ArtifactSet, ArtifactValue};
use crate::workflow::executor::{
    ExecutorError, FlowExecutor, FlowOutcome, StepContext, StepError, StepRegistry,
};

use super::{default_label_map, fetch_table, put_table, MODEL_KEY, PREDICTIONS_KEY, X_TEST_KEY};

pub const FLOW_NAME: &str = "batch-scoring";

/// Name of the appended label column.
pub const PREDICTION_COLUMN: &str = "Prediction";

pub fn flow() -> FlowDefinition {
    FlowDefinition::new(
        FLOW_NAME,
        vec![
            StepDefinition::root("start", "Start"),
            StepDefinition::after("load-data", "Load Data", &["start"]),
            StepDefinition::after("load-model", "Load Model", &["start"]),
            StepDefinition::after("batch-score", "Batch Score", &["load-data", "load-model"]),
            StepDefinition::after("save-predictions", "Save Predictions", &["batch-score"]),
        ],
    )
}

pub fn registry(objects: Arc<dyn ObjectStore>, keyed: Arc<dyn KeyedStore>) -> StepRegistry {
    let mut registry = StepRegistry::new();

    registry.register_fn("start", |_ctx: StepContext| {
        async { Ok(ArtifactSet::new()) }.boxed()
    });

    let store = Arc::clone(&objects);
    registry.register_fn("load-data", move |_ctx: StepContext| {
        let store = Arc::clone(&store);
        async move {
            let data = fetch_table(&store, X_TEST_KEY).await?;
            info!(rows = data.row_count(), "scoring input loaded");

            let mut out = ArtifactSet::new();
            out.insert("data", ArtifactValue::Table(data))?;
            Ok(out)
        }
        .boxed()
    });

    let store = Arc::clone(&objects);
    registry.register_fn("load-model", move |_ctx: StepContext| {
        let store = Arc::clone(&store);
        async move {
            let bytes = store.get(MODEL_KEY).await?;
            let tree: DecisionTree = serde_json::from_slice(&bytes)
                .map_err(|e| StepError::Other(format!("model blob is not a valid model: {e}")))?;
            info!(key = MODEL_KEY, "model loaded");

            let mut out = ArtifactSet::new();
            out.insert("model", ArtifactValue::Model(Arc::new(tree)))?;
            Ok(out)
        }
        .boxed()
    });

    registry.register_fn("batch-score", move |ctx: StepContext| {
        async move {
            let merged = ctx.merged(&["data", "model"])?;
            let data = merged.table("data")?;
            let model = merged.model("model")?;

            let scored = score(data, model.as_ref(), &default_label_map())?;
            info!(rows = scored.row_count(), "batch scored");

            let mut out = ArtifactSet::new();
            out.insert("predictions", ArtifactValue::Table(scored))?;
            Ok(out)
        }
        .boxed()
    });

    let store = Arc::clone(&objects);
    let keyed = Arc::clone(&keyed);
    registry.register_fn("save-predictions", move |ctx: StepContext| {
        let store = Arc::clone(&store);
        let keyed = Arc::clone(&keyed);
        async move {
            let predictions = ctx.upstream_one()?.table("predictions")?.clone();
            put_table(&store, PREDICTIONS_KEY, &predictions).await?;

            // One keyed entry per output row; overwrites on re-run.
            for idx in 0..predictions.row_count() {
                let row = predictions
                    .row_to_json(idx)
                    .ok_or_else(|| StepError::Other(format!("row {idx} vanished")))?;
                keyed.set(&format!("prediction:{idx}"), row).await?;
            }
            info!(rows = predictions.row_count(), key = PREDICTIONS_KEY, "predictions saved");

            let mut out = ArtifactSet::new();
            out.insert(
                "summary",
                ArtifactValue::Json(json!({ "rows": predictions.row_count() })),
            )?;
            Ok(out)
        }
        .boxed()
    });

    registry
}

pub async fn run(
    objects: Arc<dyn ObjectStore>,
    keyed: Arc<dyn KeyedStore>,
) -> Result<FlowOutcome, ExecutorError> {
    let flow = flow();
    let registry = registry(objects, keyed);
    FlowExecutor::execute(&flow, &registry, ArtifactSet::new()).await
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Score a feature table: one semantic label per input row.
///
/// The output is the input with one appended [`PREDICTION_COLUMN`]; row
/// count and order are preserved exactly. A class id the label map does
/// not cover aborts the whole batch so a corrupt label is never emitted.
pub fn score(
    data: &Table,
    model: &dyn Classifier,
    label_map: &BTreeMap<i64, String>,
) -> Result<Table, ScoringError> {
    let class_ids = model.predict(data)?;
    if class_ids.len() != data.row_count() {
        return Err(ScoringError::PredictionCountMismatch {
            expected: data.row_count(),
            found: class_ids.len(),
        });
    }

    let labels = class_ids
        .into_iter()
        .map(|class_id| {
            label_map
                .get(&class_id)
                .map(|label| Cell::Text(label.clone()))
                .ok_or(ScoringError::UnknownLabel { class_id })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut scored = data.clone();
    scored.append_column(PREDICTION_COLUMN, labels)?;
    Ok(scored)
}

/// Batch scoring failures.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    /// The model produced a class id the label map does not name.
    #[error("no label for predicted class id {class_id}")]
    UnknownLabel { class_id: i64 },

    /// The model returned a different number of predictions than rows.
    #[error("model returned {found} predictions for {expected} rows")]
    PredictionCountMismatch { expected: usize, found: usize },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Table(#[from] TableError),
}

impl From<ScoringError> for StepError {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::Model(e) => StepError::Model(e),
            ScoringError::Table(e) => StepError::Table(e),
            other => StepError::Other(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::TreeParams;
    use crate::pipeline::testutil::{MemoryKeyedStore, MemoryObjectStore};
    use crate::pipeline::FEATURE_COLUMNS;
    use churnflow_types::workflow::{RunStatus, StepStatus};

    /// A classifier that replays a fixed prediction list.
    struct Fixed(Vec<i64>);

    impl Classifier for Fixed {
        fn predict(&self, _features: &Table) -> Result<Vec<i64>, ModelError> {
            Ok(self.0.clone())
        }
    }

    fn features_csv(rows: usize) -> String {
        let mut out = FEATURE_COLUMNS.join(",");
        out.push('\n');
        for i in 0..rows {
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{}\n",
                20 + i,
                if i % 2 == 1 { 9 } else { 1 },
                i % 30,
                100 + i * 10,
                i % 25,
                i % 2,
                (i + 1) % 2,
                i % 2,
            ));
        }
        out
    }

    /// Fit a small tree over the feature schema; churn follows Support Calls.
    fn fitted_tree() -> DecisionTree {
        let table = Table::from_csv(&features_csv(20)).unwrap();
        let x = table.numeric_matrix().unwrap();
        let y: Vec<i64> = (0..20).map(|i| (i % 2) as i64).collect();
        DecisionTree::fit(&x, &y, TreeParams::default()).unwrap()
    }

    // -----------------------------------------------------------------------
    // score()
    // -----------------------------------------------------------------------

    #[test]
    fn score_appends_semantic_labels() {
        let data = Table::from_csv("a,b\n1,2\n3,4\n5,6\n").unwrap();
        let model = Fixed(vec![1, 0, 1]);
        let scored = score(&data, &model, &default_label_map()).unwrap();

        assert_eq!(scored.row_count(), 3);
        assert_eq!(scored.columns().last().unwrap(), PREDICTION_COLUMN);
        let labels = scored.column(PREDICTION_COLUMN).unwrap();
        assert_eq!(labels[0], &Cell::Text("churned".into()));
        assert_eq!(labels[1], &Cell::Text("no churned".into()));
    }

    #[test]
    fn score_preserves_input_columns_and_order() {
        let data = Table::from_csv("a,b\n1,2\n3,4\n").unwrap();
        let scored = score(&data, &Fixed(vec![0, 0]), &default_label_map()).unwrap();
        assert_eq!(&scored.columns()[..2], data.columns());
        assert_eq!(scored.row(0).unwrap()[0], Cell::Number(1.0));
        assert_eq!(scored.row(1).unwrap()[0], Cell::Number(3.0));
    }

    #[test]
    fn unknown_class_id_aborts_the_batch() {
        let data = Table::from_csv("a\n1\n2\n").unwrap();
        let err = score(&data, &Fixed(vec![0, 7]), &default_label_map()).unwrap_err();
        assert!(matches!(err, ScoringError::UnknownLabel { class_id: 7 }));
    }

    #[test]
    fn prediction_count_mismatch_detected() {
        let data = Table::from_csv("a\n1\n2\n").unwrap();
        let err = score(&data, &Fixed(vec![0]), &default_label_map()).unwrap_err();
        assert!(matches!(
            err,
            ScoringError::PredictionCountMismatch { expected: 2, found: 1 }
        ));
    }

    // -----------------------------------------------------------------------
    // Flow
    // -----------------------------------------------------------------------

    fn seeded_stores() -> (Arc<MemoryObjectStore>, Arc<MemoryKeyedStore>) {
        let objects = MemoryObjectStore::shared();
        objects.seed(X_TEST_KEY, features_csv(12));
        objects.seed(
            MODEL_KEY,
            serde_json::to_vec(&fitted_tree()).unwrap(),
        );
        (objects, MemoryKeyedStore::shared())
    }

    #[tokio::test]
    async fn flow_scores_and_persists_predictions() {
        let (objects, keyed) = seeded_stores();
        let outcome = run(objects.clone(), keyed.clone()).await.unwrap();
        assert_eq!(outcome.run.status, RunStatus::Succeeded);

        let predictions =
            Table::from_csv(&objects.text(PREDICTIONS_KEY).unwrap()).unwrap();
        assert_eq!(predictions.row_count(), 12);
        assert_eq!(predictions.columns().last().unwrap(), PREDICTION_COLUMN);

        // one keyed entry per row, labeled semantically
        assert_eq!(keyed.values.len(), 12);
        let row0 = keyed.values.get("prediction:0").unwrap().clone();
        let label = row0[PREDICTION_COLUMN].as_str().unwrap().to_string();
        assert!(label == "churned" || label == "no churned");
    }

    #[tokio::test]
    async fn missing_model_skips_the_join_but_finishes_data_branch() {
        let objects = MemoryObjectStore::shared();
        objects.seed(X_TEST_KEY, features_csv(4));
        // no model blob
        let keyed = MemoryKeyedStore::shared();

        let err = run(objects, keyed.clone()).await.unwrap_err();
        let ExecutorError::StepFailed {
            step_id, statuses, ..
        } = err
        else {
            panic!("expected a step failure");
        };
        assert_eq!(step_id, "load-model");
        assert_eq!(statuses["load-data"], StepStatus::Succeeded);
        assert_eq!(statuses["batch-score"], StepStatus::Skipped);
        assert_eq!(statuses["save-predictions"], StepStatus::Skipped);
        assert!(keyed.values.is_empty(), "no partial output persisted");
    }
}
