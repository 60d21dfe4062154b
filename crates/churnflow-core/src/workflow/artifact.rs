//! Write-once artifact store and the join-time merge policy.
//!
//! Each step publishes exactly one `ArtifactSet` (named values) under its
//! own step id; published sets are immutable and shared behind `Arc`. A
//! join step receives its predecessors' sets in branch-declaration order
//! and resolves the names it needs through [`merge_artifacts`]:
//! first-declared-branch-wins, with a hard error when a later branch
//! exposes the same name as a different kind.

use std::fmt;
use std::sync::Arc;

use churnflow_types::table::Table;
use dashmap::DashMap;
use serde_json::Value;

use crate::model::Classifier;

// ---------------------------------------------------------------------------
// ArtifactValue
// ---------------------------------------------------------------------------

/// A named value published by a step.
#[derive(Clone)]
pub enum ArtifactValue {
    /// Tabular data (feature tables, prediction tables).
    Table(Table),
    /// A fitted model, opaque beyond its `predict` capability.
    Model(Arc<dyn Classifier>),
    /// Structured metadata (summaries, counters, serialized blobs).
    Json(Value),
}

impl ArtifactValue {
    /// The kind discriminant used for merge collision checks.
    pub fn kind(&self) -> ArtifactKind {
        match self {
            ArtifactValue::Table(_) => ArtifactKind::Table,
            ArtifactValue::Model(_) => ArtifactKind::Model,
            ArtifactValue::Json(_) => ArtifactKind::Json,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            ArtifactValue::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&Arc<dyn Classifier>> {
        match self {
            ArtifactValue::Model(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ArtifactValue::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for ArtifactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactValue::Table(t) => f
                .debug_struct("Table")
                .field("rows", &t.row_count())
                .field("columns", &t.column_count())
                .finish(),
            ArtifactValue::Model(_) => f.write_str("Model(..)"),
            ArtifactValue::Json(v) => f.debug_tuple("Json").field(v).finish(),
        }
    }
}

/// Kind discriminant of an [`ArtifactValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Table,
    Model,
    Json,
}

// ---------------------------------------------------------------------------
// ArtifactSet
// ---------------------------------------------------------------------------

/// Insertion-ordered named outputs of one step.
///
/// Built up by the producing step, then published (and thereby frozen)
/// into the [`ArtifactStore`].
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    entries: Vec<(String, ArtifactValue)>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named value; a step publishes each name at most once.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: ArtifactValue,
    ) -> Result<(), ArtifactError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(ArtifactError::DuplicateName(name));
        }
        self.entries.push((name, value));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ArtifactValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Typed accessor: a required table artifact.
    pub fn table(&self, name: &str) -> Result<&Table, ArtifactError> {
        self.get(name)
            .ok_or_else(|| ArtifactError::Missing(name.to_string()))?
            .as_table()
            .ok_or_else(|| ArtifactError::WrongKind {
                name: name.to_string(),
                expected: ArtifactKind::Table,
            })
    }

    /// Typed accessor: a required model artifact.
    pub fn model(&self, name: &str) -> Result<&Arc<dyn Classifier>, ArtifactError> {
        self.get(name)
            .ok_or_else(|| ArtifactError::Missing(name.to_string()))?
            .as_model()
            .ok_or_else(|| ArtifactError::WrongKind {
                name: name.to_string(),
                expected: ArtifactKind::Model,
            })
    }

    /// Typed accessor: a required JSON artifact.
    pub fn json(&self, name: &str) -> Result<&Value, ArtifactError> {
        self.get(name)
            .ok_or_else(|| ArtifactError::Missing(name.to_string()))?
            .as_json()
            .ok_or_else(|| ArtifactError::WrongKind {
                name: name.to_string(),
                expected: ArtifactKind::Json,
            })
    }
}

// ---------------------------------------------------------------------------
// ArtifactStore
// ---------------------------------------------------------------------------

/// Per-run store mapping step id to its published artifact set.
///
/// The only state shared across steps within a run. Append-only: each
/// step publishes exactly once under its own id, and published sets are
/// immutable (`Arc`-shared, never replaced).
#[derive(Debug, Default)]
pub struct ArtifactStore {
    sets: DashMap<String, Arc<ArtifactSet>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a step's artifact set. Write-once per step id.
    pub fn publish(&self, step_id: &str, set: ArtifactSet) -> Result<(), ArtifactError> {
        use dashmap::mapref::entry::Entry;
        match self.sets.entry(step_id.to_string()) {
            Entry::Occupied(_) => Err(ArtifactError::AlreadyPublished(step_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(set));
                Ok(())
            }
        }
    }

    /// The immutable published set of a step, if it has published.
    pub fn get(&self, step_id: &str) -> Option<Arc<ArtifactSet>> {
        self.sets.get(step_id).map(|entry| Arc::clone(&entry))
    }
}

// ---------------------------------------------------------------------------
// Merge policy
// ---------------------------------------------------------------------------

/// Resolve `required` names against predecessor artifact sets in
/// branch-declaration order.
///
/// For each requested name the first branch exposing it wins. Every later
/// branch exposing the same name must agree on the artifact kind;
/// disagreement is a hard [`ArtifactError::KindMismatch`]. A name no
/// branch exposes is [`ArtifactError::Missing`]. With disjoint names the
/// result is the union and is independent of branch order.
pub fn merge_artifacts(
    required: &[&str],
    branches: &[Arc<ArtifactSet>],
) -> Result<ArtifactSet, ArtifactError> {
    let mut merged = ArtifactSet::new();
    for &name in required {
        let mut winner: Option<&ArtifactValue> = None;
        for set in branches {
            match (winner, set.get(name)) {
                (None, Some(value)) => winner = Some(value),
                (Some(first), Some(other)) if first.kind() != other.kind() => {
                    return Err(ArtifactError::KindMismatch {
                        name: name.to_string(),
                        first: first.kind(),
                        conflicting: other.kind(),
                    });
                }
                _ => {}
            }
        }
        let value = winner.ok_or_else(|| ArtifactError::Missing(name.to_string()))?;
        merged.insert(name, value.clone())?;
    }
    Ok(merged)
}

// ---------------------------------------------------------------------------
// ArtifactError
// ---------------------------------------------------------------------------

/// Errors from artifact publication and merging.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// A step tried to publish the same artifact name twice.
    #[error("artifact '{0}' already present in this set")]
    DuplicateName(String),

    /// A step tried to publish a second artifact set.
    #[error("step '{0}' has already published its artifact set")]
    AlreadyPublished(String),

    /// A required artifact name was not found in any branch.
    #[error("artifact '{0}' not found in any predecessor branch")]
    Missing(String),

    /// Two branches expose the same name with different kinds.
    #[error("artifact '{name}' has conflicting kinds across branches: {first:?} vs {conflicting:?}")]
    KindMismatch {
        name: String,
        first: ArtifactKind,
        conflicting: ArtifactKind,
    },

    /// An artifact exists but is not of the requested kind.
    #[error("artifact '{name}' is not a {expected:?}")]
    WrongKind { name: String, expected: ArtifactKind },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
