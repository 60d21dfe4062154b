//! Classification metrics.
//!
//! Only binary F1 is needed: the training flow maximizes F1 for the
//! positive class across cross-validation folds.

use super::ModelError;

/// Binary F1 score for the positive class `1`.
///
/// F1 = 2 * precision * recall / (precision + recall). Degenerate cases
/// (no predicted positives, no actual positives, or precision + recall
/// equal to zero) score 0.0 rather than erroring, so a useless model is
/// simply a bad trial.
pub fn f1_score(truth: &[i64], predictions: &[i64]) -> Result<f64, ModelError> {
    if truth.len() != predictions.len() {
        return Err(ModelError::ShapeMismatch {
            rows_x: truth.len(),
            rows_y: predictions.len(),
        });
    }

    let mut tp = 0_usize;
    let mut fp = 0_usize;
    let mut fn_ = 0_usize;
    for (&t, &p) in truth.iter().zip(predictions) {
        match (t == 1, p == 1) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }

    if tp == 0 {
        return Ok(0.0);
    }
    let precision = tp as f64 / (tp + fp) as f64;
    let recall = tp as f64 / (tp + fn_) as f64;
    Ok(2.0 * precision * recall / (precision + recall))
}
