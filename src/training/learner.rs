//! The learner contract shared by base models and ensembles

use crate::error::{KolosalError, Result};
use crate::optimizer::ParameterValue;
use ndarray::{Array1, Array2, Axis};

/// Anything that can be fit on labeled rows and then predict new rows.
///
/// Primitive models (trees, boosted trees, wrappers around external
/// libraries) live outside this crate and only need to implement this
/// trait. [`VoteEnsemble`](crate::ensemble::VoteEnsemble),
/// [`StackEnsemble`](crate::ensemble::StackEnsemble) and
/// [`BestLearner`](crate::ensemble::BestLearner) implement it as well, so
/// ensembles nest freely.
pub trait Learner: Send + Sync {
    /// Human readable name, used in logs and error stages
    fn name(&self) -> &str;

    /// Fit on `x` (one row per sample) against `y` (one label per row).
    /// A second call replaces everything learned by the first.
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Predict one value per row of `x`
    fn transform(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Deep copy, including configuration and any fitted state
    fn boxed_clone(&self) -> Box<dyn Learner>;

    /// Override one hyperparameter addressed by `path`.
    ///
    /// Meant for configuring a fresh clone, as grid expansion does; it is
    /// not a way to retune a trained learner in place. Ensembles discard
    /// their fitted model on any change, so `transform` fails with
    /// `ModelNotFitted` until the next `fit`. Learners without tunable
    /// options reject every path.
    fn set_option(&mut self, path: &[String], value: &ParameterValue) -> Result<()> {
        Err(KolosalError::InvalidParameter {
            name: path.join("."),
            value: value.to_string(),
            reason: format!("learner '{}' has no tunable options", self.name()),
        })
    }
}

impl Clone for Box<dyn Learner> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Check the fit-time invariant `labels.len() == rows(instances)`
pub(crate) fn check_fit_shapes(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(KolosalError::shape(
            format!("{} labels (one per row)", x.nrows()),
            format!("{} labels", y.len()),
        ));
    }
    if x.nrows() == 0 {
        return Err(KolosalError::ValidationError(
            "Cannot fit on an empty instance table".to_string(),
        ));
    }
    Ok(())
}

/// Check that a learner returned one prediction per input row
pub(crate) fn check_prediction_len(predictions: &Array1<f64>, n_rows: usize) -> Result<()> {
    if predictions.len() != n_rows {
        return Err(KolosalError::shape(
            format!("{} predictions", n_rows),
            format!("{} predictions", predictions.len()),
        ));
    }
    Ok(())
}

/// Copy the given rows of `x` into a new table, in index order
pub fn select_rows(x: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    x.select(Axis(0), indices)
}

/// Copy the given entries of `y`, in index order
pub fn select_labels(y: &Array1<f64>, indices: &[usize]) -> Array1<f64> {
    y.select(Axis(0), indices)
}
