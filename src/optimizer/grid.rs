//! Hyperparameter grids and their expansion into candidate learners

use super::params::{LearnerOptions, OptionPath, ParameterValue};
use crate::error::{KolosalError, Result};
use crate::training::Learner;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// Every combination of a set of option values.
///
/// Entries keep insertion order; in [`combinations`](Self::combinations)
/// the last entry varies fastest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterGrid {
    entries: Vec<(OptionPath, Vec<ParameterValue>)>,
}

impl ParameterGrid {
    /// Create an empty grid (a single, empty combination)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the candidate values for one option
    pub fn add<V: Into<ParameterValue>>(
        mut self,
        path: impl Into<OptionPath>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.entries
            .push((path.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    /// Parse a nested JSON mapping whose leaves are value lists, e.g.
    /// `{"n_estimators": [10, 50], "tree": {"max_depth": [2, 4]}}`
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Same as [`from_json`](Self::from_json) for an already parsed value
    pub fn from_value(value: &Value) -> Result<Self> {
        let mut grid = Self::new();
        match value {
            Value::Object(_) => grid.collect_entries(value, &mut Vec::new())?,
            other => {
                return Err(KolosalError::ConfigError(format!(
                    "Grid specification must be a mapping, got {}",
                    other
                )))
            }
        }
        Ok(grid)
    }

    fn collect_entries(&mut self, value: &Value, prefix: &mut Vec<String>) -> Result<()> {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    prefix.push(key.clone());
                    self.collect_entries(child, prefix)?;
                    prefix.pop();
                }
                Ok(())
            }
            Value::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| serde_json::from_value::<ParameterValue>(item.clone()))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                self.entries.push((OptionPath::new(prefix.iter().cloned()), values));
                Ok(())
            }
            other => Err(KolosalError::ConfigError(format!(
                "Grid option '{}' must list its candidate values, got {}",
                prefix.join("."),
                other
            ))),
        }
    }

    /// Option paths with their candidate values
    pub fn entries(&self) -> &[(OptionPath, Vec<ParameterValue>)] {
        &self.entries
    }

    /// Reject empty value lists, malformed paths, repeated paths and paths
    /// nested below another entry's path
    pub fn validate(&self) -> Result<()> {
        for (i, (path, values)) in self.entries.iter().enumerate() {
            path.validate()?;
            if values.is_empty() {
                return Err(KolosalError::ConfigError(format!(
                    "Grid option '{}' has no candidate values",
                    path
                )));
            }
            for (other, _) in &self.entries[..i] {
                if path == other {
                    return Err(KolosalError::ConfigError(format!(
                        "Grid option '{}' is listed more than once",
                        path
                    )));
                }
                if path.starts_with(other) || other.starts_with(path) {
                    return Err(KolosalError::ConfigError(format!(
                        "Grid options '{}' and '{}' overlap",
                        other, path
                    )));
                }
            }
        }
        self.n_combinations()?;
        Ok(())
    }

    /// Number of combinations, or a `ConfigError` when it does not fit in a `usize`
    pub fn n_combinations(&self) -> Result<usize> {
        self.entries
            .iter()
            .try_fold(1usize, |acc, (_, values)| acc.checked_mul(values.len()))
            .ok_or_else(|| {
                KolosalError::ConfigError(format!(
                    "Grid with {} options has too many combinations",
                    self.entries.len()
                ))
            })
    }

    /// Cartesian product of all value lists, one option tree per combination
    pub fn combinations(&self) -> Result<Vec<LearnerOptions>> {
        self.validate()?;

        let total = self.n_combinations()?;
        let mut out = Vec::new();
        let mut odometer = vec![0usize; self.entries.len()];

        for _ in 0..total {
            let mut options = LearnerOptions::new();
            for ((path, values), &pos) in self.entries.iter().zip(&odometer) {
                options.insert(path, values[pos].clone());
            }
            out.push(options);

            for (digit, (_, values)) in odometer.iter_mut().zip(&self.entries).rev() {
                *digit += 1;
                if *digit < values.len() {
                    break;
                }
                *digit = 0;
            }
        }

        Ok(out)
    }
}

/// A learner used as the template for one or more candidates.
///
/// `options` are fixed overrides applied to every candidate; grid values
/// are merged on top of them.
#[derive(Clone)]
pub struct Prototype {
    pub learner: Box<dyn Learner>,
    pub options: LearnerOptions,
    pub grid: Option<ParameterGrid>,
}

impl Prototype {
    pub fn new(learner: Box<dyn Learner>) -> Self {
        Self {
            learner,
            options: LearnerOptions::new(),
            grid: None,
        }
    }

    /// Set the hyperparameter grid for this prototype. The grid is checked
    /// when the prototype is expanded.
    pub fn with_grid(mut self, grid: ParameterGrid) -> Self {
        self.grid = Some(grid);
        self
    }

    /// Like [`with_grid`](Self::with_grid), but rejects a malformed grid now
    pub fn try_with_grid(self, grid: ParameterGrid) -> Result<Self> {
        grid.validate()?;
        Ok(self.with_grid(grid))
    }

    /// Set fixed option overrides for every candidate of this prototype
    pub fn with_options(mut self, options: LearnerOptions) -> Self {
        self.options = options;
        self
    }

    /// Number of candidates this prototype expands to
    pub fn n_candidates(&self) -> Result<usize> {
        self.grid.as_ref().map_or(Ok(1), ParameterGrid::n_combinations)
    }

    /// Clone the learner once per grid combination and apply the options
    pub fn expand(&self) -> Result<Vec<Box<dyn Learner>>> {
        let combinations = match &self.grid {
            Some(grid) => grid.combinations()?,
            None => vec![LearnerOptions::new()],
        };

        combinations
            .iter()
            .map(|combo| {
                let options = self.options.merged(combo);
                let mut candidate = self.learner.boxed_clone();
                options.apply_to(candidate.as_mut())?;
                debug!(
                    learner = %self.learner.name(),
                    options = ?options.leaves(),
                    "Generated candidate"
                );
                Ok(candidate)
            })
            .collect()
    }
}

impl From<Box<dyn Learner>> for Prototype {
    fn from(learner: Box<dyn Learner>) -> Self {
        Self::new(learner)
    }
}

/// Expand every prototype, in order, into one flat candidate list
pub fn expand_prototypes(prototypes: &[Prototype]) -> Result<Vec<Box<dyn Learner>>> {
    let mut candidates = Vec::new();
    for prototype in prototypes {
        candidates.extend(prototype.expand()?);
    }
    Ok(candidates)
}
