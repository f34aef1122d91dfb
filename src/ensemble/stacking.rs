//! Stacking ensemble method

use super::{rng_from_state, OutputKind};
use crate::error::{KolosalError, Result, Stage, StageExt};
use crate::optimizer::{expect_leaf, indexed_child, wrong_kind, ParameterValue};
use crate::preprocessing::LabelMap;
use crate::training::{
    check_fit_shapes, check_prediction_len, holdout_split, select_labels, select_rows, Holdout,
    Learner,
};
use crate::utils::{try_for_each_mut, try_map};
use ndarray::{s, Array1, Array2};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Configuration for stacking ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Class output one-hot encodes base predictions, regression output
    /// feeds them to the stacker as they are
    pub output: OutputKind,
    /// Fraction of rows held out to train the stacker
    pub stacker_training_proportion: f64,
    /// Whether to prepend the original features to the stacker input
    pub keep_original_features: bool,
    /// Random seed for the holdout split
    pub random_state: Option<u64>,
    /// Fit and predict with the base learners concurrently
    pub parallel: bool,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            output: OutputKind::Class,
            stacker_training_proportion: 0.3,
            keep_original_features: false,
            random_state: None,
            parallel: true,
        }
    }
}

impl StackConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings before any fitting work starts
    pub fn validate(&self) -> Result<()> {
        let p = self.stacker_training_proportion;
        if !(p > 0.0 && p < 1.0) {
            return Err(KolosalError::InvalidParameter {
                name: "stacker_training_proportion".to_string(),
                value: p.to_string(),
                reason: "must lie strictly between 0 and 1".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Clone)]
struct StackModel {
    learners: Vec<Box<dyn Learner>>,
    stacker: Box<dyn Learner>,
    label_map: Option<LabelMap>,
    keep_original_features: bool,
    n_features: usize,
    holdout: Holdout,
}

/// Trains the base learners on one part of the data and a second-stage
/// stacker on their predictions over the held-out part.
#[derive(Clone)]
pub struct StackEnsemble {
    name: String,
    config: StackConfig,
    learners: Vec<Box<dyn Learner>>,
    stacker: Option<Box<dyn Learner>>,
    model: Option<StackModel>,
}

impl StackEnsemble {
    /// Create a new stacking ensemble
    pub fn new(config: StackConfig) -> Self {
        Self {
            name: "stack_ensemble".to_string(),
            config,
            learners: Vec::new(),
            stacker: None,
            model: None,
        }
    }

    /// Add a base learner
    pub fn add_learner(mut self, learner: impl Learner + 'static) -> Self {
        self.learners.push(Box::new(learner));
        self
    }

    /// Replace the base learners
    pub fn with_learners(mut self, learners: Vec<Box<dyn Learner>>) -> Self {
        self.learners = learners;
        self
    }

    /// Set the second-stage learner
    pub fn with_stacker(mut self, stacker: impl Learner + 'static) -> Self {
        self.stacker = Some(Box::new(stacker));
        self
    }

    /// Set the name used in logs and error stages
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// The configured (unfitted) base learners
    pub fn learners(&self) -> &[Box<dyn Learner>] {
        &self.learners
    }

    /// Label map built by the last successful fit (class output only)
    pub fn label_map(&self) -> Option<&LabelMap> {
        self.model.as_ref().and_then(|m| m.label_map.as_ref())
    }

    /// Row split used by the last successful fit
    pub fn holdout(&self) -> Option<&Holdout> {
        self.model.as_ref().map(|m| &m.holdout)
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// Fit the ensemble, drawing the holdout split from `rng`
    pub fn fit_with_rng(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<()> {
        self.config.validate()?;
        if self.learners.is_empty() {
            return Err(KolosalError::ConfigError(
                "No base learners provided".to_string(),
            ));
        }
        let stacker = self.stacker.as_ref().ok_or_else(|| {
            KolosalError::ConfigError("No stacker provided".to_string())
        })?;
        check_fit_shapes(x, y)?;

        let label_map = match self.config.output {
            OutputKind::Class => Some(LabelMap::fit(y)?),
            OutputKind::Regression => None,
        };

        let holdout = holdout_split(x.nrows(), self.config.stacker_training_proportion, rng)?;
        let x_learner = select_rows(x, &holdout.learner_indices);
        let y_learner = select_labels(y, &holdout.learner_indices);
        let x_stacker = select_rows(x, &holdout.stacker_indices);
        let y_stacker = select_labels(y, &holdout.stacker_indices);

        let mut learners = self.learners.clone();
        try_for_each_mut(&mut learners, self.config.parallel, |index, learner| {
            learner.fit(&x_learner, &y_learner).at_stage(|| Stage::LearnerFit {
                index,
                name: learner.name().to_string(),
            })?;
            debug!(index, learner = %learner.name(), "Fitted base learner");
            Ok(())
        })?;

        let features = stacker_features(
            &learners,
            label_map.as_ref(),
            &x_stacker,
            self.config.keep_original_features,
            self.config.parallel,
        )?;

        if let Some(map) = &label_map {
            let held_out = LabelMap::fit(&y_stacker)?;
            if held_out.n_classes() < map.n_classes() {
                warn!(
                    ensemble = %self.name,
                    n_classes = map.n_classes(),
                    n_stacker_classes = held_out.n_classes(),
                    "Some classes are absent from the stacker subset"
                );
            }
        }

        let mut stacker = stacker.boxed_clone();
        stacker.fit(&features, &y_stacker).at_stage(|| Stage::StackerFit)?;

        info!(
            ensemble = %self.name,
            n_learners = learners.len(),
            n_learner_rows = holdout.learner_indices.len(),
            n_stacker_rows = holdout.stacker_indices.len(),
            n_classes = label_map.as_ref().map_or(0, LabelMap::n_classes),
            n_stacker_features = features.ncols(),
            "Fitted stacking ensemble"
        );

        self.model = Some(StackModel {
            learners,
            stacker,
            label_map,
            keep_original_features: self.config.keep_original_features,
            n_features: x.ncols(),
            holdout,
        });
        Ok(())
    }
}

impl Learner for StackEnsemble {
    fn name(&self) -> &str {
        &self.name
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let mut rng = rng_from_state(self.config.random_state);
        self.fit_with_rng(x, y, &mut rng)
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let model = self.model.as_ref().ok_or(KolosalError::ModelNotFitted)?;
        if model.keep_original_features && x.ncols() != model.n_features {
            return Err(KolosalError::shape(
                format!("{} feature columns", model.n_features),
                format!("{} feature columns", x.ncols()),
            ));
        }

        let features = stacker_features(
            &model.learners,
            model.label_map.as_ref(),
            x,
            model.keep_original_features,
            self.config.parallel,
        )?;

        let predictions = model
            .stacker
            .transform(&features)
            .at_stage(|| Stage::StackerTransform)?;
        check_prediction_len(&predictions, x.nrows()).at_stage(|| Stage::StackerTransform)?;
        Ok(predictions)
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
            Some("stacker") => {
                let stacker = self.stacker.as_mut().ok_or_else(|| {
                    KolosalError::ConfigError("No stacker provided".to_string())
                })?;
                if path.len() < 2 {
                    return Err(wrong_kind(path, value, "an option path below 'stacker'"));
                }
                stacker.set_option(&path[1..], value)?;
            }
            Some("stacker_training_proportion") => {
                expect_leaf(path)?;
                self.config.stacker_training_proportion =
                    value.as_float().ok_or_else(|| wrong_kind(path, value, "a number"))?;
            }
            Some("keep_original_features") => {
                expect_leaf(path)?;
                self.config.keep_original_features =
                    value.as_bool().ok_or_else(|| wrong_kind(path, value, "a bool"))?;
            }
            Some("random_state") => {
                expect_leaf(path)?;
                let seed = value
                    .as_int()
                    .filter(|s| *s >= 0)
                    .ok_or_else(|| wrong_kind(path, value, "a non-negative integer"))?;
                self.config.random_state = Some(seed as u64);
            }
            Some("output") => {
                expect_leaf(path)?;
                self.config.output = OutputKind::from_value(path, value)?;
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

/// Build the stacker input from the base learners' predictions on `x`.
///
/// With a label map, learner `i`'s prediction for a row sets a single 1.0
/// at column `i * n_classes + class_index` of an otherwise zero
/// `rows x (n_learners * n_classes)` block. Without one, each learner
/// contributes its raw prediction as one column. When
/// `keep_original_features` is set the columns of `x` come first.
pub fn stacker_features(
    learners: &[Box<dyn Learner>],
    label_map: Option<&LabelMap>,
    x: &Array2<f64>,
    keep_original_features: bool,
    parallel: bool,
) -> Result<Array2<f64>> {
    let n_samples = x.nrows();
    let predictions = try_map(learners, parallel, |index, learner| {
        let stage = || Stage::LearnerTransform {
            index,
            name: learner.name().to_string(),
        };
        let preds = learner.transform(x).at_stage(stage)?;
        check_prediction_len(&preds, n_samples).at_stage(stage)?;
        Ok(preds)
    })?;

    let offset = if keep_original_features { x.ncols() } else { 0 };
    let block_width = label_map.map_or(1, LabelMap::n_classes);
    let mut features = Array2::zeros((n_samples, offset + learners.len() * block_width));

    if keep_original_features {
        features.slice_mut(s![.., ..offset]).assign(x);
    }

    for (index, preds) in predictions.iter().enumerate() {
        let start = offset + index * block_width;
        match label_map {
            Some(map) => {
                for (row, &label) in preds.iter().enumerate() {
                    let block = features.slice_mut(s![row, start..start + block_width]);
                    map.one_hot_into(label, block).at_stage(|| Stage::LearnerTransform {
                        index,
                        name: learners[index].name().to_string(),
                    })?;
                }
            }
            None => features.column_mut(start).assign(preds),
        }
    }

    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[derive(Clone)]
    struct Echo {
        column: usize,
    }

    impl Learner for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
            Ok(())
        }

        fn transform(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
            Ok(x.column(self.column).to_owned())
        }

        fn boxed_clone(&self) -> Box<dyn Learner> {
            Box::new(self.clone())
        }
    }

    fn echoes() -> Vec<Box<dyn Learner>> {
        vec![Box::new(Echo { column: 0 }), Box::new(Echo { column: 1 })]
    }

    #[test]
    fn test_stack_config_default() {
        let config = StackConfig::default();
        assert!((config.stacker_training_proportion - 0.3).abs() < 1e-12);
        assert!(!config.keep_original_features);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stack_config_partial_json_keeps_defaults() {
        let config =
            StackConfig::from_json(r#"{"keep_original_features": true, "random_state": 7}"#).unwrap();
        assert!(config.keep_original_features);
        assert_eq!(config.random_state, Some(7));
        assert!((config.stacker_training_proportion - 0.3).abs() < 1e-12);

        assert!(StackConfig::from_json(r#"{"stacker_training_proportion": 1.5}"#).is_err());
    }

    #[test]
    fn test_one_hot_layout() {
        let x = array![[0.0, 2.0], [1.0, 1.0], [2.0, 0.0]];
        let map = LabelMap::fit(&array![0.0, 1.0, 2.0]).unwrap();

        let features = stacker_features(&echoes(), Some(&map), &x, false, false).unwrap();
        assert_eq!(
            features,
            array![
                [1.0, 0.0, 0.0, 0.0, 0.0, 1.0],
                [0.0, 1.0, 0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0, 1.0, 0.0, 0.0],
            ]
        );
    }

    #[test]
    fn test_original_features_come_first() {
        let x = array![[0.0, 1.0], [1.0, 0.0]];
        let map = LabelMap::fit(&array![0.0, 1.0]).unwrap();

        let features = stacker_features(&echoes(), Some(&map), &x, true, false).unwrap();
        assert_eq!(features.dim(), (2, 2 + 2 * 2));
        assert_eq!(features.slice(s![.., ..2]), x);
        assert_eq!(features.row(0).to_vec(), vec![0.0, 1.0, 1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_raw_columns_without_label_map() {
        let x = array![[0.5, 1.5], [2.5, 3.5]];
        let features = stacker_features(&echoes(), None, &x, false, true).unwrap();
        assert_eq!(features, x);
    }

    #[test]
    fn test_unseen_prediction_is_error() {
        let x = array![[0.0, 5.0]];
        let map = LabelMap::fit(&array![0.0, 1.0]).unwrap();
        let err = stacker_features(&echoes(), Some(&map), &x, false, false).unwrap_err();
        assert!(matches!(err.root_cause(), KolosalError::UnknownLabel(v) if *v == 5.0));
        assert_eq!(
            err.stage(),
            Some(&Stage::LearnerTransform { index: 1, name: "echo".to_string() })
        );
    }
}
