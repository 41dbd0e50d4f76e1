//! Error types shared across the crate.

use thiserror::Error;

use crate::distributions::RandomVariableKind;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("prior for parameter `{name}` must be categorical, got {kind}")]
    InvalidPrior {
        name: String,
        kind: RandomVariableKind,
    },
    #[error("all priors over parameter `{name}` must be categorical, element {index} is {kind}")]
    MixedBatch {
        name: String,
        index: usize,
        kind: RandomVariableKind,
    },
    #[error("prior batch for parameter `{name}` is empty")]
    EmptyBatch { name: String },
    #[error("parameter `{name}` is registered more than once")]
    DuplicateParameter { name: String },
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("category {index} is out of range for {num_categories} categories")]
    CategoryOutOfRange { index: usize, num_categories: usize },
    #[error("element {index} is out of range for a batch of {len}")]
    ElementOutOfRange { index: usize, len: usize },
    #[error("invalid categorical weights: {0}")]
    InvalidWeights(String),
    #[error("conditional of `{name}`[{index}] has no finite log-posterior")]
    DegenerateConditional { name: String, index: usize },

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },
    #[error("matrix is singular")]
    SingularMatrix,
    #[error("could not read tensor data: {0}")]
    TensorData(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by a parameter-group update.
///
/// Failures raised by the caller's log-likelihood are passed through untouched.
#[derive(Error, Debug)]
pub enum UpdateError<E> {
    #[error("log-likelihood evaluation failed")]
    LogLikelihood(#[source] E),
    #[error(transparent)]
    Sampler(#[from] Error),
}

impl<E> UpdateError<E> {
    /// Returns the engine error, if this is not a log-likelihood failure.
    pub fn sampler_error(&self) -> Option<&Error> {
        match self {
            UpdateError::Sampler(err) => Some(err),
            UpdateError::LogLikelihood(_) => None,
        }
    }
}
