//! Error types for explainers.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`ExplainError`].
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Errors raised while computing or storing importance arrays.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// Arrays with inconsistent shapes.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// Explainer name that cannot be parsed.
    #[error("Unknown explainer {0:?}")]
    UnknownExplainer(String),

    /// Explainer that is recognised but not provided.
    #[error("Explainer {0:?} is not supported")]
    Unsupported(String),

    /// Aggregation or divergence name that cannot be parsed.
    #[error("Unknown option {value:?} for {what}")]
    UnknownOption {
        /// Kind of option.
        what: &'static str,
        /// Offending value.
        value: String,
    },

    /// Generator checkpoint needed but absent, with fallback disabled.
    #[error("No generator checkpoint at {0} and marginal fallback is disabled")]
    MissingGenerator(PathBuf),

    /// Sampler asked for more steps than it can produce.
    #[error("Requested horizon {requested} exceeds generator horizon {available}")]
    HorizonTooLong {
        /// Requested steps.
        requested: usize,
        /// Steps the generator predicts.
        available: usize,
    },

    /// Invalid explainer configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Prediction failed.
    #[error("Prediction failed: {0}")]
    Prediction(String),

    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] txai_core::CoreError),

    /// Data or file error.
    #[error("Data error: {0}")]
    Data(#[from] txai_data::DataError),

    /// Checkpoint error.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] txai_models::CheckpointError),
}
