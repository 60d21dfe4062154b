//! Model training and scoring: decision-tree classifier, binary F1, and
//! k-fold cross-validation.
//!
//! The pipelines only ever see models through the [`Classifier`] trait;
//! the concrete [`tree::DecisionTree`] is one implementation, chosen to
//! mirror the CART classifier the training flow tunes.

pub mod cross_validate;
pub mod metrics;
pub mod tree;

use churnflow_types::table::{Table, TableError};

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// A fitted model able to assign one class id per input row.
///
/// Opaque beyond prediction: the scoring join step needs nothing else.
pub trait Classifier: Send + Sync {
    /// Predict one class id per row of `features`.
    fn predict(&self, features: &Table) -> Result<Vec<i64>, ModelError>;
}

// ---------------------------------------------------------------------------
// ModelError
// ---------------------------------------------------------------------------

/// Errors from model fitting and prediction.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A hyperparameter value is outside its legal range.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    /// The split criterion name is not recognized.
    #[error("unknown criterion '{0}' (expected 'gini' or 'entropy')")]
    UnknownCriterion(String),

    /// Fit was called with no rows.
    #[error("training set is empty")]
    EmptyTrainingSet,

    /// Feature matrix and target vector disagree on row count.
    #[error("feature matrix has {rows_x} rows but target has {rows_y}")]
    ShapeMismatch { rows_x: usize, rows_y: usize },

    /// A feature row has a different width than the first row.
    #[error("row {row} has {found} features, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Prediction input width does not match the fitted feature count.
    #[error("input has {found} features but the model was fit with {expected}")]
    FeatureCountMismatch { expected: usize, found: usize },

    /// The feature table could not be viewed numerically.
    #[error(transparent)]
    Table(#[from] TableError),
}
