//! Hyperparameter search support for the best-learner selector
//!
//! - Path-addressed learner options with recursive merge
//! - Cartesian hyperparameter grids
//! - Selection rules over cross-validated score matrices

mod params;
pub mod grid;
pub mod selection;

pub use params::{LearnerOptions, OptionNode, OptionPath, ParameterValue};
pub(crate) use params::{expect_leaf, indexed_child, wrong_kind};
pub use grid::{expand_prototypes, ParameterGrid, Prototype};
pub use selection::{BestMean, BestMedian, BestWorstCase, ScoreMatrix, SelectionRule};
