//! Label encoding between class values and dense class indices

use crate::error::{KolosalError, Result};
use ndarray::{Array1, ArrayViewMut1};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Bijection between the distinct label values seen at fit and `0..n_classes`.
///
/// Classes are indexed in ascending value order. The map is built once and
/// never grows afterwards: encoding an unseen value is an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMap {
    classes: Vec<f64>,
}

impl LabelMap {
    /// Build the map from every label value in `labels`
    pub fn fit(labels: &Array1<f64>) -> Result<Self> {
        if labels.is_empty() {
            return Err(KolosalError::ValidationError(
                "Cannot build a label map from zero labels".to_string(),
            ));
        }
        if labels.iter().any(|v| v.is_nan()) {
            return Err(KolosalError::ValidationError(
                "Labels must not contain NaN".to_string(),
            ));
        }

        let mut classes = labels.to_vec();
        classes.sort_by(f64::total_cmp);
        classes.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);

        Ok(Self { classes })
    }

    /// Number of distinct classes
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Class values, ordered by index
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Index of `label`
    pub fn encode(&self, label: f64) -> Result<usize> {
        self.classes
            .binary_search_by(|probe| probe.total_cmp(&label))
            .map_err(|_| KolosalError::UnknownLabel(label))
    }

    /// Label value at `index`
    pub fn decode(&self, index: usize) -> Result<f64> {
        self.classes.get(index).copied().ok_or_else(|| {
            KolosalError::ValidationError(format!(
                "Class index {} out of range for {} classes",
                index,
                self.classes.len()
            ))
        })
    }

    /// Write the one-hot encoding of `label` into `block`, which must have
    /// exactly `n_classes` entries, all zero
    pub fn one_hot_into(&self, label: f64, mut block: ArrayViewMut1<f64>) -> Result<()> {
        debug_assert_eq!(block.len(), self.n_classes());
        let idx = self.encode(label)?;
        block[idx] = 1.0;
        Ok(())
    }
}
