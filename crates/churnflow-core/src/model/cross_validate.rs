//! K-fold cross-validation for decision-tree hyperparameter evaluation.

use tracing::debug;

use super::metrics::f1_score;
use super::tree::{DecisionTree, TreeParams};
use super::ModelError;

/// Mean binary F1 across `k` contiguous folds.
///
/// Fold `i` holds out rows `i*n/k .. (i+1)*n/k` as the validation set and
/// fits on the rest. Rows are taken in their given order, so shuffling is
/// the caller's responsibility. Folds that end up with an empty training
/// or validation slice would only arise from `n < k`; that case is
/// rejected up front.
pub fn cross_val_f1(
    x: &[Vec<f64>],
    y: &[i64],
    params: TreeParams,
    k: usize,
) -> Result<f64, ModelError> {
    if k < 2 {
        return Err(ModelError::InvalidParam {
            name: "k".into(),
            reason: "cross-validation needs at least 2 folds".into(),
        });
    }
    if x.len() != y.len() {
        return Err(ModelError::ShapeMismatch {
            rows_x: x.len(),
            rows_y: y.len(),
        });
    }
    if x.len() < k {
        return Err(ModelError::InvalidParam {
            name: "k".into(),
            reason: format!("{} rows cannot fill {} folds", x.len(), k),
        });
    }

    let n = x.len();
    let mut total = 0.0;
    for fold in 0..k {
        let start = fold * n / k;
        let end = (fold + 1) * n / k;

        let mut train_x = Vec::with_capacity(n - (end - start));
        let mut train_y = Vec::with_capacity(n - (end - start));
        for i in (0..start).chain(end..n) {
            train_x.push(x[i].clone());
            train_y.push(y[i]);
        }

        let tree = DecisionTree::fit(&train_x, &train_y, params)?;
        let predictions = tree.predict_rows(&x[start..end])?;
        let f1 = f1_score(&y[start..end], &predictions)?;
        debug!(fold, f1, "cross-validation fold scored");
        total += f1;
    }

    Ok(total / k as f64)
}
