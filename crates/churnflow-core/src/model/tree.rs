//! CART decision-tree classifier with deterministic fitting.
//!
//! Hyperparameters mirror the classifier the training flow tunes:
//! split criterion (gini or entropy), maximum depth, minimum samples to
//! split an internal node, and minimum samples per leaf. Fitting is fully
//! deterministic: the best split is the one with the largest impurity
//! decrease, ties resolved to the lowest feature index and then the
//! lowest threshold, so the same data and parameters always produce the
//! same tree.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use churnflow_types::table::Table;

use super::{Classifier, ModelError};

// ---------------------------------------------------------------------------
// Hyperparameters
// ---------------------------------------------------------------------------

/// Impurity criterion for split selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Gini,
    Entropy,
}

impl FromStr for Criterion {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gini" => Ok(Criterion::Gini),
            "entropy" => Ok(Criterion::Entropy),
            other => Err(ModelError::UnknownCriterion(other.to_string())),
        }
    }
}

/// Decision-tree hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub criterion: Criterion,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            criterion: Criterion::Gini,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl TreeParams {
    /// Check the parameters are in their legal ranges.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.max_depth < 1 {
            return Err(ModelError::InvalidParam {
                name: "max_depth".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.min_samples_split < 2 {
            return Err(ModelError::InvalidParam {
                name: "min_samples_split".into(),
                reason: "must be at least 2".into(),
            });
        }
        if self.min_samples_leaf < 1 {
            return Err(ModelError::InvalidParam {
                name: "min_samples_leaf".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tree structure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
enum Node {
    Leaf {
        class: i64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A fitted CART decision tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    params: TreeParams,
    n_features: usize,
    root: Node,
}

impl DecisionTree {
    /// Fit a tree on a feature matrix and integer class targets.
    pub fn fit(x: &[Vec<f64>], y: &[i64], params: TreeParams) -> Result<Self, ModelError> {
        params.validate()?;
        if x.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if x.len() != y.len() {
            return Err(ModelError::ShapeMismatch {
                rows_x: x.len(),
                rows_y: y.len(),
            });
        }
        let n_features = x[0].len();
        for (row, r) in x.iter().enumerate() {
            if r.len() != n_features {
                return Err(ModelError::RaggedRow {
                    row,
                    expected: n_features,
                    found: r.len(),
                });
            }
        }

        let indices: Vec<usize> = (0..x.len()).collect();
        let root = grow(x, y, &indices, 0, &params);
        Ok(Self {
            params,
            n_features,
            root,
        })
    }

    /// The hyperparameters this tree was fit with.
    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    /// Predict one class id per feature row.
    pub fn predict_rows(&self, x: &[Vec<f64>]) -> Result<Vec<i64>, ModelError> {
        let mut out = Vec::with_capacity(x.len());
        for row in x {
            if row.len() != self.n_features {
                return Err(ModelError::FeatureCountMismatch {
                    expected: self.n_features,
                    found: row.len(),
                });
            }
            out.push(predict_row(&self.root, row));
        }
        Ok(out)
    }
}

impl Classifier for DecisionTree {
    fn predict(&self, features: &Table) -> Result<Vec<i64>, ModelError> {
        let matrix = features.numeric_matrix()?;
        self.predict_rows(&matrix)
    }
}

// ---------------------------------------------------------------------------
// Fitting internals
// ---------------------------------------------------------------------------

fn grow(x: &[Vec<f64>], y: &[i64], indices: &[usize], depth: usize, params: &TreeParams) -> Node {
    let majority = majority_class(y, indices);
    if depth >= params.max_depth
        || indices.len() < params.min_samples_split
        || is_pure(y, indices)
    {
        return Node::Leaf { class: majority };
    }

    let Some((feature, threshold)) = best_split(x, y, indices, params) else {
        return Node::Leaf { class: majority };
    };

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .partition(|&&i| x[i][feature] <= threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(x, y, &left_idx, depth + 1, params)),
        right: Box::new(grow(x, y, &right_idx, depth + 1, params)),
    }
}

/// Find the (feature, threshold) with the largest impurity decrease, or
/// `None` when no split satisfies the leaf-size constraint with positive
/// gain. Candidate thresholds are midpoints between consecutive distinct
/// feature values; strict `>` comparison keeps the earliest candidate on
/// ties.
fn best_split(
    x: &[Vec<f64>],
    y: &[i64],
    indices: &[usize],
    params: &TreeParams,
) -> Option<(usize, f64)> {
    let n = indices.len() as f64;
    let parent = impurity(y, indices, params.criterion);

    let n_features = x[indices[0]].len();
    let mut best: Option<(usize, f64)> = None;
    let mut best_gain = 0.0_f64;

    for feature in 0..n_features {
        let mut values: Vec<f64> = indices.iter().map(|&i| x[i][feature]).collect();
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();

        for pair in values.windows(2) {
            let threshold = (pair[0] + pair[1]) / 2.0;
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| x[i][feature] <= threshold);
            if left.len() < params.min_samples_leaf || right.len() < params.min_samples_leaf {
                continue;
            }
            let weighted = (left.len() as f64 / n) * impurity(y, &left, params.criterion)
                + (right.len() as f64 / n) * impurity(y, &right, params.criterion);
            let gain = parent - weighted;
            if gain > best_gain + 1e-12 {
                best_gain = gain;
                best = Some((feature, threshold));
            }
        }
    }

    best
}

fn impurity(y: &[i64], indices: &[usize], criterion: Criterion) -> f64 {
    let n = indices.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let counts = class_counts(y, indices);
    match criterion {
        Criterion::Gini => {
            1.0 - counts
                .iter()
                .map(|&(_, c)| {
                    let p = c as f64 / n;
                    p * p
                })
                .sum::<f64>()
        }
        Criterion::Entropy => -counts
            .iter()
            .map(|&(_, c)| {
                let p = c as f64 / n;
                p * p.log2()
            })
            .sum::<f64>(),
    }
}

/// Class counts in ascending class order.
fn class_counts(y: &[i64], indices: &[usize]) -> Vec<(i64, usize)> {
    let mut counts = std::collections::BTreeMap::new();
    for &i in indices {
        *counts.entry(y[i]).or_insert(0usize) += 1;
    }
    counts.into_iter().collect()
}

/// Most frequent class; ties resolved to the smallest class id.
fn majority_class(y: &[i64], indices: &[usize]) -> i64 {
    let counts = class_counts(y, indices);
    let mut best = (0_i64, 0_usize);
    for (class, count) in counts {
        if count > best.1 {
            best = (class, count);
        }
    }
    best.0
}

fn is_pure(y: &[i64], indices: &[usize]) -> bool {
    indices.windows(2).all(|w| y[w[0]] == y[w[1]])
}

fn predict_row(node: &Node, row: &[f64]) -> i64 {
    match node {
        Node::Leaf { class } => *class,
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if row[*feature] <= *threshold {
                predict_row(left, row)
            } else {
                predict_row(right, row)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
