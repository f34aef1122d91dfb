//! Scoring of predictions against true labels

use crate::error::{KolosalError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Scores predictions against the truth. Higher is better.
pub trait Scorer: Send + Sync {
    fn score(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64>;
}

impl<F> Scorer for F
where
    F: Fn(&Array1<f64>, &Array1<f64>) -> Result<f64> + Send + Sync,
{
    fn score(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        self(y_true, y_pred)
    }
}

/// Built-in metrics, oriented so that higher is better
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreType {
    /// Fraction of exactly matching predictions
    #[default]
    Accuracy,
    /// Mean of per-class recall over the classes present in the truth
    BalancedAccuracy,
    /// Negated mean squared error
    NegMeanSquaredError,
    /// Negated mean absolute error
    NegMeanAbsoluteError,
}

impl ScoreType {
    pub fn name(&self) -> &'static str {
        match self {
            ScoreType::Accuracy => "accuracy",
            ScoreType::BalancedAccuracy => "balanced_accuracy",
            ScoreType::NegMeanSquaredError => "neg_mean_squared_error",
            ScoreType::NegMeanAbsoluteError => "neg_mean_absolute_error",
        }
    }
}

impl FromStr for ScoreType {
    type Err = KolosalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "accuracy" => Ok(ScoreType::Accuracy),
            "balanced_accuracy" => Ok(ScoreType::BalancedAccuracy),
            "neg_mean_squared_error" => Ok(ScoreType::NegMeanSquaredError),
            "neg_mean_absolute_error" => Ok(ScoreType::NegMeanAbsoluteError),
            _ => Err(KolosalError::ConfigError(format!("Unknown score type: {}", s))),
        }
    }
}

impl Scorer for ScoreType {
    fn score(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        if y_true.len() != y_pred.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(KolosalError::ValidationError(format!(
                "Cannot compute {} on zero samples",
                self.name()
            )));
        }

        let n = y_true.len() as f64;
        let score = match self {
            ScoreType::Accuracy => {
                let correct = y_true
                    .iter()
                    .zip(y_pred.iter())
                    .filter(|(t, p)| t == p)
                    .count();
                correct as f64 / n
            }
            ScoreType::BalancedAccuracy => {
                // class bits -> (hits, total)
                let mut per_class: BTreeMap<u64, (usize, usize)> = BTreeMap::new();
                for (t, p) in y_true.iter().zip(y_pred.iter()) {
                    let entry = per_class.entry(t.to_bits()).or_insert((0, 0));
                    entry.1 += 1;
                    if t == p {
                        entry.0 += 1;
                    }
                }
                let recall_sum: f64 = per_class
                    .values()
                    .map(|&(hits, total)| hits as f64 / total as f64)
                    .sum();
                recall_sum / per_class.len() as f64
            }
            ScoreType::NegMeanSquaredError => {
                -y_true
                    .iter()
                    .zip(y_pred.iter())
                    .map(|(t, p)| (t - p).powi(2))
                    .sum::<f64>()
                    / n
            }
            ScoreType::NegMeanAbsoluteError => {
                -y_true
                    .iter()
                    .zip(y_pred.iter())
                    .map(|(t, p)| (t - p).abs())
                    .sum::<f64>()
                    / n
            }
        };

        Ok(score)
    }
}
