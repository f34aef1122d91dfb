//! Kolosal Ensemble - meta-learners that combine other learners
//!
//! This crate provides ensembles that are themselves learners, so they
//! nest freely:
//! - Voting over base learners (majority or mean)
//! - Stacking with a holdout-trained second-stage learner
//! - Best-learner selection by cross-validated grid search
//!
//! # Modules
//!
//! - [`ensemble`] - Vote, stack and best-learner ensembles
//! - [`training`] - The [`Learner`](training::Learner) trait, partitioning and scoring
//! - [`optimizer`] - Hyperparameter grids, learner options and selection rules
//! - [`preprocessing`] - Label maps for one-hot stacker features
//! - [`utils`] - Order-preserving parallel helpers

// Core error handling
pub mod error;

pub mod ensemble;
pub mod optimizer;
pub mod preprocessing;
pub mod training;
pub mod utils;

pub use error::{KolosalError, Result, Stage};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{KolosalError, Result, Stage};

    // Learner contract, partitioning and scoring
    pub use crate::training::{
        holdout_split, CVResults, CVStrategy, Holdout, Learner, Partition, PartitionGenerator,
        ScoreType, Scorer,
    };

    // Ensembles
    pub use crate::ensemble::{
        BestLearner, BestLearnerConfig, OutputKind, StackConfig, StackEnsemble, VoteConfig,
        VoteEnsemble,
    };

    // Hyperparameter search
    pub use crate::optimizer::{
        BestMean, BestMedian, BestWorstCase, LearnerOptions, OptionPath, ParameterGrid,
        ParameterValue, Prototype, ScoreMatrix, SelectionRule,
    };

    // Preprocessing
    pub use crate::preprocessing::LabelMap;
}
