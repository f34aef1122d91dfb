//! Data partitioning: holdout splits and cross-validation partitions

use crate::error::{KolosalError, Result};
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A training index set. The rows it leaves out form the validation set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub train_indices: Vec<usize>,
    pub fold_idx: usize,
}

impl Partition {
    /// Every index in `0..n_samples` that is not a training index, ascending
    pub fn validation_indices(&self, n_samples: usize) -> Vec<usize> {
        let mut in_train = vec![false; n_samples];
        for &i in &self.train_indices {
            if i < n_samples {
                in_train[i] = true;
            }
        }
        (0..n_samples).filter(|&i| !in_train[i]).collect()
    }

    /// Check indices are in range and both sides of the split are non-empty
    pub(crate) fn validate(&self, n_samples: usize) -> Result<()> {
        if self.train_indices.is_empty() {
            return Err(KolosalError::ValidationError(format!(
                "Partition {} has no training rows",
                self.fold_idx
            )));
        }
        if let Some(&bad) = self.train_indices.iter().find(|&&i| i >= n_samples) {
            return Err(KolosalError::ValidationError(format!(
                "Partition {} references row {} but only {} rows exist",
                self.fold_idx, bad, n_samples
            )));
        }
        if self.validation_indices(n_samples).is_empty() {
            return Err(KolosalError::ValidationError(format!(
                "Partition {} leaves no rows for validation",
                self.fold_idx
            )));
        }
        Ok(())
    }
}

/// A single random split into a base-learner subset and a stacker subset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holdout {
    pub learner_indices: Vec<usize>,
    pub stacker_indices: Vec<usize>,
}

/// Split `0..n_samples` at random, reserving `round(n_samples * proportion)`
/// rows for the stacker subset. Both subsets must end up non-empty.
pub fn holdout_split(n_samples: usize, proportion: f64, rng: &mut ChaCha8Rng) -> Result<Holdout> {
    if !(proportion > 0.0 && proportion < 1.0) {
        return Err(KolosalError::InvalidParameter {
            name: "stacker_training_proportion".to_string(),
            value: proportion.to_string(),
            reason: "must lie strictly between 0 and 1".to_string(),
        });
    }

    let n_stacker = (n_samples as f64 * proportion).round() as usize;
    if n_stacker == 0 || n_stacker >= n_samples {
        return Err(KolosalError::ValidationError(format!(
            "Cannot split {} samples with proportion {}: one subset would be empty",
            n_samples, proportion
        )));
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    indices.shuffle(rng);
    let stacker_indices = indices.split_off(n_samples - n_stacker);

    Ok(Holdout {
        learner_indices: indices,
        stacker_indices,
    })
}

/// Produces the partitions a candidate is cross-validated on
pub trait PartitionGenerator: Send + Sync {
    fn partitions(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<Partition>>;
}

impl<F> PartitionGenerator for F
where
    F: Fn(&Array2<f64>, &Array1<f64>, &mut ChaCha8Rng) -> Result<Vec<Partition>> + Send + Sync,
{
    fn partitions(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<Partition>> {
        self(x, y, rng)
    }
}

/// Cross-validation strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Stratified K-Fold (maintains class distribution)
    StratifiedKFold { n_splits: usize, shuffle: bool },
    /// Repeated shuffled K-Fold
    RepeatedKFold { n_splits: usize, n_repeats: usize },
    /// Leave-one-out cross-validation
    LeaveOneOut,
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::KFold { n_splits: 5, shuffle: true }
    }
}

impl CVStrategy {
    /// Generate the training partitions for `n_samples` rows
    pub fn split(
        &self,
        n_samples: usize,
        y: Option<&Array1<f64>>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<Partition>> {
        match self {
            CVStrategy::KFold { n_splits, shuffle } => {
                k_fold_split(n_samples, *n_splits, *shuffle, rng)
            }
            CVStrategy::StratifiedKFold { n_splits, shuffle } => {
                let y = y.ok_or_else(|| {
                    KolosalError::ValidationError(
                        "StratifiedKFold requires target array".to_string(),
                    )
                })?;
                stratified_k_fold_split(n_samples, y, *n_splits, *shuffle, rng)
            }
            CVStrategy::RepeatedKFold { n_splits, n_repeats } => {
                let mut all = Vec::with_capacity(n_splits * n_repeats);
                for repeat in 0..*n_repeats {
                    let mut splits = k_fold_split(n_samples, *n_splits, true, rng)?;
                    for split in &mut splits {
                        split.fold_idx += repeat * n_splits;
                    }
                    all.extend(splits);
                }
                Ok(all)
            }
            CVStrategy::LeaveOneOut => leave_one_out_split(n_samples),
        }
    }
}

impl PartitionGenerator for CVStrategy {
    fn partitions(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<Partition>> {
        self.split(x.nrows(), Some(y), rng)
    }
}

fn check_fold_count(n_samples: usize, n_splits: usize) -> Result<()> {
    if n_splits < 2 {
        return Err(KolosalError::ValidationError(
            "n_splits must be at least 2".to_string(),
        ));
    }
    if n_samples < n_splits {
        return Err(KolosalError::ValidationError(format!(
            "n_samples ({}) must be >= n_splits ({})",
            n_samples, n_splits
        )));
    }
    Ok(())
}

/// Turn validation folds into training partitions (each fold's complement)
fn folds_to_partitions(folds: &[Vec<usize>]) -> Vec<Partition> {
    (0..folds.len())
        .map(|fold_idx| {
            let mut train_indices: Vec<usize> = folds
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != fold_idx)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            train_indices.sort_unstable();
            Partition {
                train_indices,
                fold_idx,
            }
        })
        .collect()
}

fn k_fold_split(
    n_samples: usize,
    n_splits: usize,
    shuffle: bool,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<Partition>> {
    check_fold_count(n_samples, n_splits)?;

    let mut indices: Vec<usize> = (0..n_samples).collect();
    if shuffle {
        indices.shuffle(rng);
    }

    let base = n_samples / n_splits;
    let remainder = n_samples % n_splits;
    let mut folds = Vec::with_capacity(n_splits);
    let mut current = 0;
    for i in 0..n_splits {
        let fold_size = if i < remainder { base + 1 } else { base };
        folds.push(indices[current..current + fold_size].to_vec());
        current += fold_size;
    }

    Ok(folds_to_partitions(&folds))
}

fn stratified_k_fold_split(
    n_samples: usize,
    y: &Array1<f64>,
    n_splits: usize,
    shuffle: bool,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<Partition>> {
    check_fold_count(n_samples, n_splits)?;
    if y.len() != n_samples {
        return Err(KolosalError::ShapeError {
            expected: format!("{} labels", n_samples),
            actual: format!("{} labels", y.len()),
        });
    }

    // Ordered by class so a seeded rng gives the same folds on every run
    let mut class_indices: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
    for (idx, &val) in y.iter().enumerate() {
        class_indices.entry(val.to_bits()).or_default().push(idx);
    }

    if shuffle {
        for indices in class_indices.values_mut() {
            indices.shuffle(rng);
        }
    }

    // Deal classes round-robin, continuing where the previous class stopped
    let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
    let mut next = 0;
    for indices in class_indices.values() {
        for &idx in indices {
            folds[next % n_splits].push(idx);
            next += 1;
        }
    }

    Ok(folds_to_partitions(&folds))
}

fn leave_one_out_split(n_samples: usize) -> Result<Vec<Partition>> {
    if n_samples < 2 {
        return Err(KolosalError::ValidationError(
            "LeaveOneOut requires at least 2 samples".to_string(),
        ));
    }
    Ok((0..n_samples)
        .map(|i| Partition {
            train_indices: (0..n_samples).filter(|&j| j != i).collect(),
            fold_idx: i,
        })
        .collect())
}

/// Cross-validation results for one candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each partition
    pub scores: Vec<f64>,
    /// Mean score across partitions
    pub mean_score: f64,
    /// Standard deviation of scores
    pub std_score: f64,
    /// Number of partitions
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from partition scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;
        let std_score = variance.sqrt();

        Self {
            scores,
            mean_score,
            std_score,
            n_folds,
        }
    }
}
