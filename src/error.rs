//! Error types for the Kolosal ensemble framework

use std::fmt;
use thiserror::Error;

/// Result type alias for Kolosal ensemble operations
pub type Result<T> = std::result::Result<T, KolosalError>;

/// Sub-step of a multi-stage fit or transform that an error is attributed to
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Generating the cross-validation partitions
    PartitionGeneration,
    /// Expanding prototypes over their hyperparameter grids
    GridExpansion,
    /// Fitting one base learner
    LearnerFit { index: usize, name: String },
    /// Predicting with one base learner
    LearnerTransform { index: usize, name: String },
    /// Fitting the second-stage learner of a stack
    StackerFit,
    /// Predicting with the second-stage learner of a stack
    StackerTransform,
    /// Fitting and scoring one candidate on one partition
    CandidateScoring { candidate: usize, partition: usize },
    /// Applying the selection rule to the score matrix
    Selection,
    /// Refitting the selected candidate on the full data
    Refit { index: usize, name: String },
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::PartitionGeneration => write!(f, "partition generation"),
            Stage::GridExpansion => write!(f, "grid expansion"),
            Stage::LearnerFit { index, name } => write!(f, "fit of learner #{} ({})", index, name),
            Stage::LearnerTransform { index, name } => {
                write!(f, "transform of learner #{} ({})", index, name)
            }
            Stage::StackerFit => write!(f, "stacker fit"),
            Stage::StackerTransform => write!(f, "stacker transform"),
            Stage::CandidateScoring { candidate, partition } => {
                write!(f, "scoring of candidate #{} on partition #{}", candidate, partition)
            }
            Stage::Selection => write!(f, "selection"),
            Stage::Refit { index, name } => write!(f, "refit of candidate #{} ({})", index, name),
        }
    }
}

/// Main error type for the ensemble framework
#[derive(Error, Debug)]
pub enum KolosalError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Label {0} was not seen during fit")]
    UnknownLabel(f64),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<KolosalError>,
    },
}

impl KolosalError {
    /// Attribute an error to a named sub-step, keeping the original as its source
    pub fn at(stage: Stage, source: KolosalError) -> Self {
        KolosalError::Stage {
            stage,
            source: Box::new(source),
        }
    }

    /// The stage this error was attributed to, if any (outermost first)
    pub fn stage(&self) -> Option<&Stage> {
        match self {
            KolosalError::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// The innermost error, with every stage wrapper removed
    pub fn root_cause(&self) -> &KolosalError {
        let mut err = self;
        while let KolosalError::Stage { source, .. } = err {
            err = source;
        }
        err
    }

    pub(crate) fn shape(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        KolosalError::ShapeError {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Attach a [`Stage`] to the error side of a result
pub(crate) trait StageExt<T> {
    fn at_stage(self, stage: impl FnOnce() -> Stage) -> Result<T>;
}

impl<T> StageExt<T> for Result<T> {
    fn at_stage(self, stage: impl FnOnce() -> Stage) -> Result<T> {
        self.map_err(|e| KolosalError::at(stage(), e))
    }
}

impl From<serde_json::Error> for KolosalError {
    fn from(err: serde_json::Error) -> Self {
        KolosalError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for KolosalError {
    fn from(err: ndarray::ShapeError) -> Self {
        KolosalError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
