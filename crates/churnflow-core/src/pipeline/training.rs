//! Model training flow: `load-data -> train-model -> save-model`.
//!
//! Loads the model-ready training split, searches the decision-tree
//! hyperparameter space by maximizing mean 5-fold cross-validated F1,
//! refits the best configuration on the full training partition, and
//! serializes the fitted model to the object store.

use std::str::FromStr;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::json;
use tracing::info;

use churnflow_types::search::{Direction, ParamDomain, TrialConfig};
use churnflow_types::workflow::{FlowDefinition, StepDefinition};

use crate::model::cross_validate::cross_val_f1;
use crate::model::tree::{Criterion, DecisionTree, TreeParams};
use crate::search::{optimize, RandomSampler, SearchSpace};
use crate::store::ObjectStore;
use crate::workflow::artifact::{ArtifactSet, ArtifactValue};
use crate::workflow::executor::{
    ExecutorError, FlowExecutor, FlowOutcome, StepContext, StepError, StepRegistry,
};

use super::{fetch_table, CV_FOLDS, MODEL_KEY, TARGET_COLUMN, X_TRAIN_KEY, Y_TRAIN_KEY};

pub const FLOW_NAME: &str = "model-training";

pub fn flow() -> FlowDefinition {
    FlowDefinition::new(
        FLOW_NAME,
        vec![
            StepDefinition::root("load-data", "Load Data"),
            StepDefinition::after("train-model", "Train Model", &["load-data"]),
            StepDefinition::after("save-model", "Save Model", &["train-model"]),
        ],
    )
}

/// The searchable hyperparameter space, mirroring the tuned classifier.
pub fn search_space() -> SearchSpace {
    SearchSpace::new()
        .add("criterion", ParamDomain::Categorical {
            choices: vec!["gini".into(), "entropy".into()],
        })
        .add("max_depth", ParamDomain::IntRange { low: 1, high: 30 })
        .add("min_samples_split", ParamDomain::IntRange { low: 2, high: 20 })
        .add("min_samples_leaf", ParamDomain::IntRange { low: 1, high: 20 })
}

/// Decode a sampled configuration into tree hyperparameters.
pub fn params_from_config(config: &TrialConfig) -> Result<TreeParams, StepError> {
    let criterion = config
        .text("criterion")
        .ok_or_else(|| StepError::Other("trial config missing 'criterion'".into()))?;
    let int = |name: &str| {
        config
            .int(name)
            .ok_or_else(|| StepError::Other(format!("trial config missing '{name}'")))
    };
    Ok(TreeParams {
        criterion: Criterion::from_str(criterion)?,
        max_depth: int("max_depth")? as usize,
        min_samples_split: int("min_samples_split")? as usize,
        min_samples_leaf: int("min_samples_leaf")? as usize,
    })
}

pub fn registry(objects: Arc<dyn ObjectStore>, trial_budget: usize, seed: u64) -> StepRegistry {
    let mut registry = StepRegistry::new();

    let store = Arc::clone(&objects);
    registry.register_fn("load-data", move |_ctx: StepContext| {
        let store = Arc::clone(&store);
        async move {
            let features = fetch_table(&store, X_TRAIN_KEY).await?;
            let target = fetch_table(&store, Y_TRAIN_KEY).await?;
            info!(rows = features.row_count(), "training split loaded");

            let mut out = ArtifactSet::new();
            out.insert("features", ArtifactValue::Table(features))?;
            out.insert("target", ArtifactValue::Table(target))?;
            Ok(out)
        }
        .boxed()
    });

    registry.register_fn("train-model", move |ctx: StepContext| {
        async move {
            let upstream = ctx.upstream_one()?;
            let x = upstream.table("features")?.numeric_matrix()?;
            let y: Vec<i64> = upstream
                .table("target")?
                .numeric_column(TARGET_COLUMN)?
                .into_iter()
                .map(|v| v as i64)
                .collect();

            let space = search_space();
            let sampler = RandomSampler::seeded(seed);
            let outcome = optimize(&space, Direction::Maximize, trial_budget, sampler, |config| {
                let params = params_from_config(config)
                    .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { e.to_string().into() })?;
                Ok(cross_val_f1(&x, &y, params, CV_FOLDS)?)
            })?;

            let best = outcome
                .study
                .best_trial()
                .ok_or_else(|| StepError::Other("search finished without trials".into()))?;
            info!(
                trial = best.number,
                f1 = best.value,
                "search complete, refitting best configuration"
            );

            let params = params_from_config(&outcome.best_config)?;
            let tree = DecisionTree::fit(&x, &y, params)?;
            let model_json = serde_json::to_value(&tree)
                .map_err(|e| StepError::Other(format!("model serialization failed: {e}")))?;

            let mut out = ArtifactSet::new();
            out.insert("model", ArtifactValue::Model(Arc::new(tree)))?;
            out.insert("model_json", ArtifactValue::Json(model_json))?;
            out.insert(
                "study",
                ArtifactValue::Json(json!({
                    "best_trial": best.number,
                    "best_value": best.value,
                    "trials": outcome.study.trials().len(),
                    "champion_events": outcome.events.len(),
                })),
            )?;
            Ok(out)
        }
        .boxed()
    });

    let store = Arc::clone(&objects);
    registry.register_fn("save-model", move |ctx: StepContext| {
        let store = Arc::clone(&store);
        async move {
            let upstream = ctx.upstream_one()?;
            let model_json = upstream.json("model_json")?;
            let bytes = serde_json::to_vec_pretty(model_json)
                .map_err(|e| StepError::Other(format!("model serialization failed: {e}")))?;
            store.put(MODEL_KEY, bytes).await?;
            info!(key = MODEL_KEY, "model saved");

            let mut out = ArtifactSet::new();
            out.insert("study", ArtifactValue::Json(upstream.json("study")?.clone()))?;
            Ok(out)
        }
        .boxed()
    });

    registry
}

pub async fn run(
    objects: Arc<dyn ObjectStore>,
    trial_budget: usize,
    seed: u64,
) -> Result<FlowOutcome, ExecutorError> {
    let flow = flow();
    let registry = registry(objects, trial_budget, seed);
    FlowExecutor::execute(&flow, &registry, ArtifactSet::new()).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testutil::MemoryObjectStore;
    use crate::pipeline::FEATURE_COLUMNS;
    use churnflow_types::search::ParamValue;
    use churnflow_types::table::Table;
    use churnflow_types::workflow::RunStatus;

    /// A separable training split over the full feature schema: churn is
    /// decided by Support Calls.
    fn seeded_store(rows: usize) -> Arc<MemoryObjectStore> {
        let mut x = FEATURE_COLUMNS.join(",");
        x.push('\n');
        let mut y = String::from("Churn\n");
        for i in 0..rows {
            let churned = i % 2;
            let support_calls = if churned == 1 { 9 } else { 1 };
            x.push_str(&format!(
                "{},{},{},{},{},{},{},{}\n",
                20 + (i % 40),
                support_calls,
                i % 30,
                100 + i * 10,
                i % 25,
                i % 2,
                (i + 1) % 2,
                i % 2,
            ));
            y.push_str(&format!("{churned}\n"));
        }

        let store = MemoryObjectStore::shared();
        store.seed(X_TRAIN_KEY, x);
        store.seed(Y_TRAIN_KEY, y);
        store
    }

    #[test]
    fn search_space_covers_all_tree_params() {
        let space = search_space();
        assert!(space.validate().is_ok());
        let names: Vec<&str> = space.params().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["criterion", "max_depth", "min_samples_split", "min_samples_leaf"]
        );
    }

    #[test]
    fn params_from_config_decodes_sampled_values() {
        let config = TrialConfig(vec![
            ("criterion".into(), ParamValue::Text("entropy".into())),
            ("max_depth".into(), ParamValue::Int(7)),
            ("min_samples_split".into(), ParamValue::Int(4)),
            ("min_samples_leaf".into(), ParamValue::Int(2)),
        ]);
        let params = params_from_config(&config).unwrap();
        assert_eq!(params.criterion, Criterion::Entropy);
        assert_eq!(params.max_depth, 7);
        assert_eq!(params.min_samples_split, 4);
        assert_eq!(params.min_samples_leaf, 2);
    }

    #[test]
    fn params_from_config_rejects_missing_fields() {
        let config = TrialConfig(vec![("max_depth".into(), ParamValue::Int(7))]);
        assert!(params_from_config(&config).is_err());
    }

    #[tokio::test]
    async fn flow_trains_and_persists_a_model() {
        let store = seeded_store(60);
        let outcome = run(store.clone(), 3, 42).await.unwrap();
        assert_eq!(outcome.run.status, RunStatus::Succeeded);

        let blob = store.bytes(MODEL_KEY).expect("model blob written");
        let tree: DecisionTree = serde_json::from_slice(&blob).unwrap();

        // the persisted model predicts over the training schema
        let features = Table::from_csv(&store.text(X_TRAIN_KEY).unwrap()).unwrap();
        let preds = tree.predict_rows(&features.numeric_matrix().unwrap()).unwrap();
        assert_eq!(preds.len(), 60);
    }

    #[tokio::test]
    async fn terminal_reports_the_study_summary() {
        let store = seeded_store(40);
        let outcome = run(store, 4, 7).await.unwrap();
        let study = outcome.terminal.json("study").unwrap();
        assert_eq!(study["trials"], serde_json::json!(4));
        assert!(study["best_value"].as_f64().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn same_seed_trains_the_same_model() {
        let a = seeded_store(40);
        let b = seeded_store(40);
        run(a.clone(), 3, 42).await.unwrap();
        run(b.clone(), 3, 42).await.unwrap();
        assert_eq!(a.bytes(MODEL_KEY), b.bytes(MODEL_KEY));
    }

    #[tokio::test]
    async fn missing_training_split_fails_the_run() {
        let store = MemoryObjectStore::shared();
        let err = run(store, 3, 42).await.unwrap_err();
        let ExecutorError::StepFailed { step_id, run, .. } = err else {
            panic!("expected a step failure");
        };
        assert_eq!(step_id, "load-data");
        assert_eq!(run.status, RunStatus::Failed);
    }
}
