//! Workflow domain types for Churnflow.
//!
//! Defines the canonical representation of a pipeline flow: an acyclic
//! graph of named steps with declared dependency edges, plus the
//! execution tracking types (`FlowRun`, per-step statuses) the executor
//! maintains while a run is in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Flow Definition
// ---------------------------------------------------------------------------

/// A pipeline flow definition: an acyclic graph of steps.
///
/// The graph must have exactly one start node (no `depends_on`) and
/// exactly one terminal node (no successors); the DAG validator in
/// `churnflow-core` enforces this at definition time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    /// UUIDv7 assigned when the flow is defined.
    pub id: Uuid,
    /// Human-readable flow name (e.g. "batch-scoring").
    pub name: String,
    /// Steps forming the flow DAG, in declaration order.
    pub steps: Vec<StepDefinition>,
}

impl FlowDefinition {
    /// Create a flow definition with a fresh UUIDv7.
    pub fn new(name: impl Into<String>, steps: Vec<StepDefinition>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            steps,
        }
    }

    /// Look up a step definition by id.
    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == id)
    }
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// A single step in the flow DAG.
///
/// The executable body is registered separately with the executor; the
/// definition only carries identity and dependency edges. The order of
/// `depends_on` is significant: it is the branch-declaration order used
/// by the join-time artifact merge policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Step id, unique within a flow (e.g. "load-model").
    pub id: String,
    /// Human-readable step name.
    pub name: String,
    /// Step ids this step depends on (DAG edges), in branch order.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl StepDefinition {
    /// Convenience constructor for a step with no dependencies.
    pub fn root(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            depends_on: Vec::new(),
        }
    }

    /// Convenience constructor for a step with dependencies.
    pub fn after(
        id: impl Into<String>,
        name: impl Into<String>,
        depends_on: &[&str],
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// A step with more than one dependency is a join.
    pub fn is_join(&self) -> bool {
        self.depends_on.len() > 1
    }
}

// ---------------------------------------------------------------------------
// Execution status
// ---------------------------------------------------------------------------

/// Status of an individual step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// The step was not run because a transitive dependency failed.
    Skipped,
}

impl StepStatus {
    /// Whether the step has reached a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// Overall status of a flow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

// ---------------------------------------------------------------------------
// Flow Run (audit record)
// ---------------------------------------------------------------------------

/// A single execution instance of a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRun {
    /// UUIDv7 run id.
    pub id: Uuid,
    /// Id of the flow definition being executed.
    pub flow_id: Uuid,
    /// Name of the flow (denormalized for display).
    pub flow_name: String,
    /// Current run status.
    pub status: RunStatus,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run completed (None if still running).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message if the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FlowRun {
    /// Create a new running record for a flow.
    pub fn start(flow: &FlowDefinition) -> Self {
        Self {
            id: Uuid::now_v7(),
            flow_id: flow.id,
            flow_name: flow.name.clone(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Mark the run finished with the given status.
    pub fn finish(&mut self, status: RunStatus, error: Option<String>) {
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.error = error;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
