//! Best-learner selection through cross-validated grid search

use super::rng_from_state;
use crate::error::{KolosalError, Result, Stage, StageExt};
use crate::optimizer::{
    expand_prototypes, expect_leaf, indexed_child, wrong_kind, BestMean, ParameterGrid,
    ParameterValue, Prototype, ScoreMatrix, SelectionRule,
};
use crate::training::{
    check_fit_shapes, check_prediction_len, select_labels, select_rows, CVResults, CVStrategy,
    Learner, PartitionGenerator, ScoreType, Scorer,
};
use crate::utils::try_map;
use ndarray::{Array1, Array2};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Configuration for the best-learner selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BestLearnerConfig {
    /// Metric used when no custom scorer is set
    pub score_type: ScoreType,
    /// Partitioning used when no custom partition generator is set
    pub partition: CVStrategy,
    /// Random seed for partition generation
    pub random_state: Option<u64>,
    /// Score (candidate, partition) pairs concurrently
    pub parallel: bool,
}

impl Default for BestLearnerConfig {
    fn default() -> Self {
        Self {
            score_type: ScoreType::Accuracy,
            partition: CVStrategy::default(),
            random_state: None,
            parallel: true,
        }
    }
}

impl BestLearnerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Clone)]
struct BestLearnerModel {
    best: Box<dyn Learner>,
    best_index: usize,
    candidates: Vec<Box<dyn Learner>>,
    scores: ScoreMatrix,
}

/// Training and validation rows of one partition
struct Fold {
    x_train: Array2<f64>,
    y_train: Array1<f64>,
    x_val: Array2<f64>,
    y_val: Array1<f64>,
}

/// Cross-validates every candidate learner, keeps the best one and refits
/// it on all rows.
///
/// Candidates come from prototypes: a prototype with a grid contributes one
/// candidate per grid combination, one without contributes itself.
#[derive(Clone)]
pub struct BestLearner {
    name: String,
    config: BestLearnerConfig,
    prototypes: Vec<Prototype>,
    partition_generator: Option<Arc<dyn PartitionGenerator>>,
    selection_rule: Arc<dyn SelectionRule>,
    scorer: Option<Arc<dyn Scorer>>,
    model: Option<BestLearnerModel>,
}

impl BestLearner {
    pub fn new(config: BestLearnerConfig) -> Self {
        Self {
            name: "best_learner".to_string(),
            config,
            prototypes: Vec::new(),
            partition_generator: None,
            selection_rule: Arc::new(BestMean),
            scorer: None,
            model: None,
        }
    }

    /// Add a learner that is evaluated as it is
    pub fn add_learner(self, learner: impl Learner + 'static) -> Self {
        self.add_prototype(Prototype::new(Box::new(learner)))
    }

    /// Add a learner together with its hyperparameter grid. A malformed
    /// grid is reported by `fit`, at the grid expansion stage.
    pub fn add_grid(self, learner: impl Learner + 'static, grid: ParameterGrid) -> Self {
        self.add_prototype(Prototype::new(Box::new(learner)).with_grid(grid))
    }

    /// Like [`add_grid`](Self::add_grid), but rejects a malformed grid now
    pub fn try_add_grid(self, learner: impl Learner + 'static, grid: ParameterGrid) -> Result<Self> {
        let prototype = Prototype::new(Box::new(learner)).try_with_grid(grid)?;
        Ok(self.add_prototype(prototype))
    }

    pub fn add_prototype(mut self, prototype: Prototype) -> Self {
        self.prototypes.push(prototype);
        self
    }

    /// Replace the configured partitioning with a custom generator
    pub fn with_partition_generator(mut self, generator: impl PartitionGenerator + 'static) -> Self {
        self.partition_generator = Some(Arc::new(generator));
        self
    }

    pub fn with_selection_rule(mut self, rule: impl SelectionRule + 'static) -> Self {
        self.selection_rule = Arc::new(rule);
        self
    }

    /// Replace the configured score type with a custom scorer
    pub fn with_scorer(mut self, scorer: impl Scorer + 'static) -> Self {
        self.scorer = Some(Arc::new(scorer));
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(&self) -> &BestLearnerConfig {
        &self.config
    }

    pub fn prototypes(&self) -> &[Prototype] {
        &self.prototypes
    }

    /// Expand the prototypes into the candidate list a fit would evaluate
    pub fn expand_candidates(&self) -> Result<Vec<Box<dyn Learner>>> {
        expand_prototypes(&self.prototypes)
    }

    /// Index of the selected candidate
    pub fn best_index(&self) -> Option<usize> {
        self.model.as_ref().map(|m| m.best_index)
    }

    /// The selected candidate, refit on all rows
    pub fn best_learner(&self) -> Option<&dyn Learner> {
        self.model.as_ref().map(|m| m.best.as_ref())
    }

    /// Candidates evaluated by the last fit, unfitted, in score-matrix order
    pub fn candidates(&self) -> Option<&[Box<dyn Learner>]> {
        self.model.as_ref().map(|m| m.candidates.as_slice())
    }

    /// Candidate x partition scores from the last fit
    pub fn scores(&self) -> Option<&ScoreMatrix> {
        self.model.as_ref().map(|m| &m.scores)
    }

    /// Summary of one candidate's scores across partitions
    pub fn cv_results(&self, candidate: usize) -> Option<CVResults> {
        let scores = self.scores()?;
        if candidate >= scores.nrows() {
            return None;
        }
        Some(CVResults::from_scores(scores.row(candidate).to_vec()))
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// Fit the selector, drawing partitions from `rng`
    pub fn fit_with_rng(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<()> {
        check_fit_shapes(x, y)?;
        let n_samples = x.nrows();

        let candidates = expand_prototypes(&self.prototypes).at_stage(|| Stage::GridExpansion)?;
        if candidates.is_empty() {
            return Err(KolosalError::ConfigError(
                "No candidate learners provided".to_string(),
            ));
        }

        let partitions = match &self.partition_generator {
            Some(generator) => generator.partitions(x, y, rng),
            None => self.config.partition.partitions(x, y, rng),
        }
        .at_stage(|| Stage::PartitionGeneration)?;
        if partitions.is_empty() {
            return Err(KolosalError::at(
                Stage::PartitionGeneration,
                KolosalError::ConfigError("No partitions generated".to_string()),
            ));
        }
        for partition in &partitions {
            partition
                .validate(n_samples)
                .at_stage(|| Stage::PartitionGeneration)?;
        }

        let folds: Vec<Fold> = partitions
            .iter()
            .map(|partition| {
                let val = partition.validation_indices(n_samples);
                Fold {
                    x_train: select_rows(x, &partition.train_indices),
                    y_train: select_labels(y, &partition.train_indices),
                    x_val: select_rows(x, &val),
                    y_val: select_labels(y, &val),
                }
            })
            .collect();

        let scorer: &dyn Scorer = match &self.scorer {
            Some(scorer) => scorer.as_ref(),
            None => &self.config.score_type,
        };

        let n_candidates = candidates.len();
        let n_partitions = folds.len();
        let pairs: Vec<(usize, usize)> = (0..n_candidates)
            .flat_map(|c| (0..n_partitions).map(move |p| (c, p)))
            .collect();

        let flat = try_map(&pairs, self.config.parallel, |_, &(candidate, partition)| {
            let score = score_candidate(candidates[candidate].as_ref(), &folds[partition], scorer)
                .at_stage(|| Stage::CandidateScoring { candidate, partition })?;
            debug!(candidate, partition, score, "Scored candidate");
            Ok(score)
        })?;
        let scores = ScoreMatrix::from_shape_vec((n_candidates, n_partitions), flat)?;

        let best_index = self
            .selection_rule
            .select(&scores)
            .at_stage(|| Stage::Selection)?;
        if best_index >= n_candidates {
            return Err(KolosalError::at(
                Stage::Selection,
                KolosalError::ValidationError(format!(
                    "Selected candidate {} but only {} candidates exist",
                    best_index, n_candidates
                )),
            ));
        }

        let mut best = candidates[best_index].boxed_clone();
        best.fit(x, y).at_stage(|| Stage::Refit {
            index: best_index,
            name: best.name().to_string(),
        })?;

        info!(
            selector = %self.name,
            n_candidates,
            n_partitions,
            best_index,
            best = %best.name(),
            mean_score = scores.row(best_index).mean().unwrap_or(f64::NAN),
            "Selected best learner"
        );

        self.model = Some(BestLearnerModel {
            best,
            best_index,
            candidates,
            scores,
        });
        Ok(())
    }
}

/// Fit a fresh copy of `candidate` on the fold's training rows and score
/// its predictions on the validation rows
fn score_candidate(candidate: &dyn Learner, fold: &Fold, scorer: &dyn Scorer) -> Result<f64> {
    let mut learner = candidate.boxed_clone();
    learner.fit(&fold.x_train, &fold.y_train)?;
    let predictions = learner.transform(&fold.x_val)?;
    check_prediction_len(&predictions, fold.y_val.len())?;
    scorer.score(&fold.y_val, &predictions)
}

impl Learner for BestLearner {
    fn name(&self) -> &str {
        &self.name
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let mut rng = rng_from_state(self.config.random_state);
        self.fit_with_rng(x, y, &mut rng)
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let model = self.model.as_ref().ok_or(KolosalError::ModelNotFitted)?;
        model.best.transform(x)
    }

    fn boxed_clone(&self) -> Box<dyn Learner> {
        Box::new(self.clone())
    }

    fn set_option(&mut self, path: &[String], value: &ParameterValue) -> Result<()> {
        match path.first().map(String::as_str) {
            Some("learners") => {
                let (index, rest) = indexed_child(&path[1..], self.prototypes.len())?;
                self.prototypes[index].learner.set_option(rest, value)?;
            }
            Some("score_type") => {
                expect_leaf(path)?;
                self.config.score_type = value
                    .as_string()
                    .ok_or_else(|| wrong_kind(path, value, "a score type name"))?
                    .parse()?;
            }
            Some("random_state") => {
                expect_leaf(path)?;
                let seed = value
                    .as_int()
                    .filter(|s| *s >= 0)
                    .ok_or_else(|| wrong_kind(path, value, "a non-negative integer"))?;
                self.config.random_state = Some(seed as u64);
            }
            Some("parallel") => {
                expect_leaf(path)?;
                self.config.parallel =
                    value.as_bool().ok_or_else(|| wrong_kind(path, value, "a bool"))?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::OptionPath;
    use crate::training::Partition;
    use ndarray::array;
    use rand::SeedableRng;

    /// Predicts `offset + column 0`, so offset 0 is a perfect fit on the
    /// test data below
    #[derive(Clone)]
    struct Offset {
        offset: f64,
    }

    impl Learner for Offset {
        fn name(&self) -> &str {
            "offset"
        }

        fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
            Ok(())
        }

        fn transform(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
            Ok(x.column(0).mapv(|v| v + self.offset))
        }

        fn boxed_clone(&self) -> Box<dyn Learner> {
            Box::new(self.clone())
        }

        fn set_option(&mut self, path: &[String], value: &ParameterValue) -> Result<()> {
            match path {
                [key] if key == "offset" => {
                    self.offset = value.as_float().ok_or_else(|| wrong_kind(path, value, "a number"))?;
                    Ok(())
                }
                _ => Err(wrong_kind(path, value, "offset")),
            }
        }
    }

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = array![[0.0], [1.0], [0.0], [1.0], [0.0], [1.0]];
        let y = array![0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_config_from_json() {
        let config = BestLearnerConfig::from_json(
            r#"{"score_type": "balanced_accuracy", "partition": {"k_fold": {"n_splits": 3, "shuffle": false}}}"#,
        )
        .unwrap();
        assert_eq!(config.score_type, ScoreType::BalancedAccuracy);
        assert_eq!(config.partition, CVStrategy::KFold { n_splits: 3, shuffle: false });
        assert!(config.parallel);
    }

    #[test]
    fn test_grid_search_picks_exact_candidate() {
        let (x, y) = data();
        let grid = ParameterGrid::new().add("offset", vec![1.0, 0.0, -1.0]);
        let config = BestLearnerConfig {
            partition: CVStrategy::KFold { n_splits: 3, shuffle: true },
            ..Default::default()
        };
        let mut selector = BestLearner::new(config).add_grid(Offset { offset: 5.0 }, grid);

        selector
            .fit_with_rng(&x, &y, &mut ChaCha8Rng::seed_from_u64(3))
            .unwrap();

        assert_eq!(selector.best_index(), Some(1));
        assert_eq!(selector.scores().unwrap().dim(), (3, 3));
        assert_eq!(selector.transform(&x).unwrap(), y);
        let results = selector.cv_results(1).unwrap();
        assert!((results.mean_score - 1.0).abs() < 1e-12);
        assert!(selector.cv_results(3).is_none());
    }

    #[test]
    fn test_partition_without_validation_rows_is_rejected() {
        let (x, y) = data();
        let all_rows = |x: &Array2<f64>, _y: &Array1<f64>, _rng: &mut ChaCha8Rng| -> Result<Vec<Partition>> {
            Ok(vec![Partition {
                train_indices: (0..x.nrows()).collect(),
                fold_idx: 0,
            }])
        };
        let mut selector = BestLearner::new(BestLearnerConfig::default())
            .add_learner(Offset { offset: 0.0 })
            .with_partition_generator(all_rows);

        let err = selector.fit(&x, &y).unwrap_err();
        assert_eq!(err.stage(), Some(&Stage::PartitionGeneration));
        assert!(!selector.is_fitted());
    }

    #[test]
    fn test_set_option_routes_to_prototype() {
        let mut selector =
            BestLearner::new(BestLearnerConfig::default()).add_learner(Offset { offset: 2.0 });
        selector
            .set_option(&OptionPath::from("learners.0.offset"), &ParameterValue::Float(0.5))
            .unwrap();
        selector
            .set_option(
                &OptionPath::from("score_type"),
                &ParameterValue::from("neg_mean_absolute_error"),
            )
            .unwrap();

        let candidates = selector.expand_candidates().unwrap();
        let preds = candidates[0].transform(&array![[1.0]]).unwrap();
        assert_eq!(preds, array![1.5]);
        assert_eq!(selector.config().score_type, ScoreType::NegMeanAbsoluteError);
        assert!(selector
            .set_option(&OptionPath::from("learners.1.offset"), &ParameterValue::Float(0.0))
            .is_err());
    }
}
