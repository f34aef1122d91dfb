//! Ensemble methods module
//!
//! Provides meta-learners that are themselves learners:
//! - Voting (majority or mean over base learners)
//! - Stacking (holdout-trained second-stage learner)
//! - Best-learner selection (grid search plus cross-validation)

mod voting;
mod stacking;
mod best_learner;

pub use voting::{majority_vote, mean_vote, VoteConfig, VoteEnsemble};
pub use stacking::{stacker_features, StackConfig, StackEnsemble};
pub use best_learner::{BestLearner, BestLearnerConfig};

use crate::error::Result;
use crate::optimizer::{wrong_kind, ParameterValue};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// What kind of value the base learners predict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Discrete class labels
    #[default]
    Class,
    /// Continuous values
    Regression,
}

impl OutputKind {
    pub(crate) fn from_value(path: &[String], value: &ParameterValue) -> Result<Self> {
        match value.as_string() {
            Some("class") => Ok(OutputKind::Class),
            Some("regression") => Ok(OutputKind::Regression),
            _ => Err(wrong_kind(path, value, "'class' or 'regression'")),
        }
    }
}

/// Seeded generator when a seed is configured, OS entropy otherwise
pub(crate) fn rng_from_state(random_state: Option<u64>) -> ChaCha8Rng {
    match random_state {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}
