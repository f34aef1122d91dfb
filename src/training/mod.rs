//! Learner contract, data partitioning and scoring
//!
//! Provides the pieces every ensemble is built from:
//! - The [`Learner`] trait that base models and ensembles implement
//! - Holdout splits and cross-validation partitions
//! - Scoring of predictions against true labels

mod learner;
pub mod cross_validation;
pub mod metrics;

pub use learner::{select_labels, select_rows, Learner};
pub(crate) use learner::{check_fit_shapes, check_prediction_len};
pub use cross_validation::{holdout_split, CVResults, CVStrategy, Holdout, Partition, PartitionGenerator};
pub use metrics::{ScoreType, Scorer};
