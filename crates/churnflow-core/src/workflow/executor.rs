//! Wave-based parallel flow executor.
//!
//! Steps whose dependencies are satisfied run concurrently on a
//! `tokio::JoinSet`, one wave at a time. Artifacts flow only along
//! declared edges: each task receives its predecessors' published sets in
//! branch-declaration order and publishes exactly one set of its own.
//! Failure is fail-fast with maximal progress: independent steps already
//! running in the failing wave complete, every step not yet started is
//! marked skipped, no further wave starts, and the run fails naming the
//! originating step.

use std::collections::HashMap;
use std::sync::Arc;

use churnflow_types::table::TableError;
use churnflow_types::workflow::{FlowDefinition, FlowRun, RunStatus, StepStatus};
use futures_util::future::BoxFuture;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::model::ModelError;
use crate::search::SearchError;
use crate::store::StoreError;
use crate::workflow::artifact::{
    merge_artifacts, ArtifactError, ArtifactSet, ArtifactStore,
};
use crate::workflow::dag::{build_execution_plan, GraphError};

// ---------------------------------------------------------------------------
// Step context and bodies
// ---------------------------------------------------------------------------

/// Everything a step body may read: run identity, the flow-level initial
/// inputs (start step only), and the predecessors' published artifact
/// sets in branch-declaration order.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub run_id: Uuid,
    pub step_id: String,
    /// Flow-level inputs; non-empty only for the start step.
    pub inputs: Arc<ArtifactSet>,
    /// Predecessor artifact sets, ordered as `depends_on` declares them.
    pub upstream: Vec<Arc<ArtifactSet>>,
}

impl StepContext {
    /// The single predecessor's set; errors for start steps and joins.
    pub fn upstream_one(&self) -> Result<&Arc<ArtifactSet>, StepError> {
        match self.upstream.as_slice() {
            [only] => Ok(only),
            other => Err(StepError::Other(format!(
                "step '{}' expected exactly one predecessor, found {}",
                self.step_id,
                other.len()
            ))),
        }
    }

    /// Resolve `required` artifact names across all predecessor branches
    /// using the first-declared-branch-wins merge policy.
    pub fn merged(&self, required: &[&str]) -> Result<ArtifactSet, StepError> {
        Ok(merge_artifacts(required, &self.upstream)?)
    }
}

/// An executable step body, registered against a step id.
pub trait StepBody: Send + Sync {
    fn run(&self, ctx: StepContext) -> BoxFuture<'static, Result<ArtifactSet, StepError>>;
}

/// Adapter turning an async closure into a [`StepBody`].
pub struct FnStep<F>(pub F);

impl<F> StepBody for FnStep<F>
where
    F: Fn(StepContext) -> BoxFuture<'static, Result<ArtifactSet, StepError>> + Send + Sync,
{
    fn run(&self, ctx: StepContext) -> BoxFuture<'static, Result<ArtifactSet, StepError>> {
        (self.0)(ctx)
    }
}

/// Maps step ids to their executable bodies.
#[derive(Default)]
pub struct StepRegistry {
    bodies: HashMap<String, Arc<dyn StepBody>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, step_id: impl Into<String>, body: Arc<dyn StepBody>) {
        self.bodies.insert(step_id.into(), body);
    }

    /// Register an async closure as a step body.
    pub fn register_fn<F>(&mut self, step_id: impl Into<String>, f: F)
    where
        F: Fn(StepContext) -> BoxFuture<'static, Result<ArtifactSet, StepError>>
            + Send
            + Sync
            + 'static,
    {
        self.register(step_id, Arc::new(FnStep(f)));
    }

    pub fn get(&self, step_id: &str) -> Option<&Arc<dyn StepBody>> {
        self.bodies.get(step_id)
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// The result of a successful run.
#[derive(Debug)]
pub struct FlowOutcome {
    /// Audit record with final status and timestamps.
    pub run: FlowRun,
    /// Terminal status of every step in the flow (all `Succeeded`).
    pub statuses: HashMap<String, StepStatus>,
    /// The terminal step's published artifacts.
    pub terminal: Arc<ArtifactSet>,
}

pub struct FlowExecutor;

impl FlowExecutor {
    /// Execute a flow to completion.
    ///
    /// Definition-level problems (malformed DAG, unregistered step body)
    /// fail before any step runs. A step body failure fails the run with
    /// [`ExecutorError::StepFailed`] naming the originating step; the
    /// error carries the finished audit record and per-step statuses,
    /// with every step that never started marked `Skipped`.
    pub async fn execute(
        flow: &FlowDefinition,
        registry: &StepRegistry,
        initial_inputs: ArtifactSet,
    ) -> Result<FlowOutcome, ExecutorError> {
        let waves = build_execution_plan(&flow.steps)?;
        for step in &flow.steps {
            if registry.get(&step.id).is_none() {
                return Err(ExecutorError::MissingBody(step.id.clone()));
            }
        }

        let mut run = FlowRun::start(flow);
        let mut statuses: HashMap<String, StepStatus> = flow
            .steps
            .iter()
            .map(|s| (s.id.clone(), StepStatus::Pending))
            .collect();

        info!(run_id = %run.id, flow = %flow.name, waves = waves.len(), "flow run started");

        let store = ArtifactStore::new();
        let inputs = Arc::new(initial_inputs);
        let mut failure: Option<(String, StepError)> = None;

        'waves: for (wave_idx, wave) in waves.iter().enumerate() {
            let mut tasks: JoinSet<(String, Result<ArtifactSet, StepError>)> = JoinSet::new();

            for step in wave {
                // Dependencies all published in earlier waves.
                let upstream: Vec<Arc<ArtifactSet>> = step
                    .depends_on
                    .iter()
                    .map(|dep| {
                        store.get(dep).ok_or_else(|| {
                            ExecutorError::MissingUpstream {
                                step: step.id.clone(),
                                dependency: dep.clone(),
                            }
                        })
                    })
                    .collect::<Result<_, _>>()?;

                let ctx = StepContext {
                    run_id: run.id,
                    step_id: step.id.clone(),
                    inputs: if step.depends_on.is_empty() {
                        Arc::clone(&inputs)
                    } else {
                        Arc::new(ArtifactSet::new())
                    },
                    upstream,
                };

                statuses.insert(step.id.clone(), StepStatus::Running);
                info!(run_id = %run.id, step = %step.id, wave = wave_idx, "step started");

                let body = Arc::clone(
                    registry
                        .get(&step.id)
                        .ok_or_else(|| ExecutorError::MissingBody(step.id.clone()))?,
                );
                let step_id = step.id.clone();
                tasks.spawn(async move {
                    let result = body.run(ctx).await;
                    (step_id, result)
                });
            }

            // Let every step in the wave finish before deciding the run's
            // fate, so independent branches make maximal progress.
            while let Some(joined) = tasks.join_next().await {
                let (step_id, result) = joined.map_err(|e| ExecutorError::Join(e.to_string()))?;
                match result {
                    Ok(artifacts) => {
                        info!(run_id = %run.id, step = %step_id, artifacts = artifacts.len(), "step succeeded");
                        store.publish(&step_id, artifacts)?;
                        statuses.insert(step_id, StepStatus::Succeeded);
                    }
                    Err(err) => {
                        error!(run_id = %run.id, step = %step_id, error = %err, "step failed");
                        statuses.insert(step_id.clone(), StepStatus::Failed);
                        if failure.is_none() {
                            failure = Some((step_id, err));
                        }
                    }
                }
            }

            if failure.is_some() {
                break 'waves;
            }
        }

        if let Some((step_id, cause)) = failure {
            for status in statuses.values_mut() {
                if *status == StepStatus::Pending {
                    *status = StepStatus::Skipped;
                }
            }
            let skipped = statuses
                .values()
                .filter(|s| **s == StepStatus::Skipped)
                .count();
            warn!(run_id = %run.id, step = %step_id, skipped, "flow run failed");
            run.finish(
                RunStatus::Failed,
                Some(format!("step '{step_id}' failed: {cause}")),
            );
            return Err(ExecutorError::StepFailed {
                step_id,
                cause: Box::new(cause),
                run: Box::new(run),
                statuses,
            });
        }

        // Validation guarantees exactly one terminal step, in the last wave.
        let terminal_id = waves
            .last()
            .and_then(|wave| wave.first())
            .map(|step| step.id.clone())
            .unwrap_or_default();
        let terminal = store
            .get(&terminal_id)
            .ok_or(ExecutorError::MissingTerminal(terminal_id))?;

        run.finish(RunStatus::Succeeded, None);
        info!(run_id = %run.id, flow = %flow.name, "flow run succeeded");

        Ok(FlowOutcome {
            run,
            statuses,
            terminal,
        })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A step body failure, from any of the engine's collaborators.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("{0}")]
    Other(String),
}

impl StepError {
    pub fn other(msg: impl Into<String>) -> Self {
        StepError::Other(msg.into())
    }
}

/// Run-level failures.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The flow definition is malformed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// No body registered for a defined step.
    #[error("no body registered for step '{0}'")]
    MissingBody(String),

    /// A dependency finished without publishing (engine invariant breach).
    #[error("step '{step}' scheduled before dependency '{dependency}' published")]
    MissingUpstream { step: String, dependency: String },

    /// The terminal step succeeded but published nothing under its id.
    #[error("terminal step '{0}' published no artifacts")]
    MissingTerminal(String),

    /// A step published twice or misused the artifact store.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// A step task panicked or was cancelled.
    #[error("step task join failure: {0}")]
    Join(String),

    /// A step body raised; the originating failure, with the finished
    /// audit record and every never-started step marked `Skipped`.
    #[error("step '{step_id}' failed: {cause}")]
    StepFailed {
        step_id: String,
        #[source]
        cause: Box<StepError>,
        run: Box<FlowRun>,
        statuses: HashMap<String, StepStatus>,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
