//! Voting ensemble

use super::OutputKind;
use crate::error::{KolosalError, Result, Stage, StageExt};
use crate::optimizer::{expect_leaf, indexed_child, wrong_kind, ParameterValue};
use crate::training::{check_fit_shapes, check_prediction_len, Learner};
use crate::utils::{try_for_each_mut, try_map};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info};

/// Configuration for the voting ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoteConfig {
    /// Class output takes the per-row mode, regression output the mean
    pub output: OutputKind,
    /// Fit and predict with the base learners concurrently
    pub parallel: bool,
}

impl Default for VoteConfig {
    fn default() -> Self {
        Self {
            output: OutputKind::Class,
            parallel: true,
        }
    }
}

impl VoteConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Clone)]
struct VoteModel {
    learners: Vec<Box<dyn Learner>>,
}

/// Trains every base learner on the full data and predicts by majority vote.
///
/// The configured learners are prototypes: each fit trains fresh copies of
/// them and keeps those copies as the model.
#[derive(Clone)]
pub struct VoteEnsemble {
    name: String,
    config: VoteConfig,
    learners: Vec<Box<dyn Learner>>,
    model: Option<VoteModel>,
}

impl VoteEnsemble {
    /// Create a new voting ensemble over `learners`
    pub fn new(learners: Vec<Box<dyn Learner>>) -> Self {
        Self {
            name: "vote_ensemble".to_string(),
            config: VoteConfig::default(),
            learners,
            model: None,
        }
    }

    /// Add a base learner
    pub fn add_learner(mut self, learner: impl Learner + 'static) -> Self {
        self.learners.push(Box::new(learner));
        self
    }

    /// Set the configuration
    pub fn with_config(mut self, config: VoteConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the name used in logs and error stages
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(&self) -> &VoteConfig {
        &self.config
    }

    /// The configured (unfitted) base learners
    pub fn learners(&self) -> &[Box<dyn Learner>] {
        &self.learners
    }

    /// The base learners trained by the last successful fit
    pub fn fitted_learners(&self) -> Option<&[Box<dyn Learner>]> {
        self.model.as_ref().map(|m| m.learners.as_slice())
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }
}

impl Learner for VoteEnsemble {
    fn name(&self) -> &str {
        &self.name
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if self.learners.is_empty() {
            return Err(KolosalError::ConfigError(
                "No base learners provided".to_string(),
            ));
        }
        check_fit_shapes(x, y)?;

        let mut learners = self.learners.clone();
        try_for_each_mut(&mut learners, self.config.parallel, |index, learner| {
            learner.fit(x, y).at_stage(|| Stage::LearnerFit {
                index,
                name: learner.name().to_string(),
            })?;
            debug!(index, learner = %learner.name(), "Fitted base learner");
            Ok(())
        })?;

        info!(
            ensemble = %self.name,
            n_learners = learners.len(),
            n_samples = x.nrows(),
            "Fitted voting ensemble"
        );
        self.model = Some(VoteModel { learners });
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let model = self.model.as_ref().ok_or(KolosalError::ModelNotFitted)?;

        let predictions = try_map(&model.learners, self.config.parallel, |index, learner| {
            let stage = || Stage::LearnerTransform {
                index,
                name: learner.name().to_string(),
            };
            let preds = learner.transform(x).at_stage(stage)?;
            check_prediction_len(&preds, x.nrows()).at_stage(stage)?;
            Ok(preds)
        })?;

        match self.config.output {
            OutputKind::Class => majority_vote(&predictions),
            OutputKind::Regression => mean_vote(&predictions),
        }
    }

    fn boxed_clone(&self) -> Box<dyn Learner> {
        Box::new(self.clone())
    }

    fn set_option(&mut self, path: &[String], value: &ParameterValue) -> Result<()> {
        match path.first().map(String::as_str) {
            Some("learners") => {
                let (index, rest) = indexed_child(&path[1..], self.learners.len())?;
                self.learners[index].set_option(rest, value)?;
            }
            Some("output") => {
                expect_leaf(path)?;
                self.config.output = OutputKind::from_value(path, value)?;
            }
            Some("parallel") => {
                expect_leaf(path)?;
                self.config.parallel = value.as_bool().ok_or_else(|| wrong_kind(path, value, "a bool"))?;
            }
            _ => {
                return Err(KolosalError::InvalidParameter {
                    name: path.join("."),
                    value: value.to_string(),
                    reason: format!("unknown option for '{}'", self.name),
                })
            }
        }
        self.model = None;
        Ok(())
    }
}

/// Per-row mode across the prediction vectors of several learners.
///
/// When several values are equally frequent the lowest one wins, whatever
/// the learner order.
pub fn majority_vote(predictions: &[Array1<f64>]) -> Result<Array1<f64>> {
    let n_samples = check_vote_inputs(predictions)?;

    let mut column = Vec::with_capacity(predictions.len());
    let result = (0..n_samples)
        .map(|row| {
            column.clear();
            column.extend(predictions.iter().map(|p| p[row]));
            column.sort_by(f64::total_cmp);

            let mut winner = column[0];
            let mut best_count = 0;
            let mut start = 0;
            while start < column.len() {
                let value = column[start];
                let end = column[start..]
                    .iter()
                    .position(|v| v.total_cmp(&value) != Ordering::Equal)
                    .map_or(column.len(), |offset| start + offset);
                // Strictly greater keeps the lowest value on ties
                if end - start > best_count {
                    best_count = end - start;
                    winner = value;
                }
                start = end;
            }
            winner
        })
        .collect();

    Ok(result)
}

/// Per-row arithmetic mean across the prediction vectors of several learners
pub fn mean_vote(predictions: &[Array1<f64>]) -> Result<Array1<f64>> {
    check_vote_inputs(predictions)?;

    let mut sum = predictions[0].clone();
    for preds in &predictions[1..] {
        sum += preds;
    }
    Ok(sum / predictions.len() as f64)
}

fn check_vote_inputs(predictions: &[Array1<f64>]) -> Result<usize> {
    let first = predictions.first().ok_or_else(|| {
        KolosalError::ValidationError("No predictions provided".to_string())
    })?;
    let n_samples = first.len();
    if let Some(bad) = predictions.iter().find(|p| p.len() != n_samples) {
        return Err(KolosalError::shape(
            format!("{} predictions from every learner", n_samples),
            format!("{} predictions", bad.len()),
        ));
    }
    Ok(n_samples)
}
