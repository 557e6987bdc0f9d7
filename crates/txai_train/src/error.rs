//! Error types for training.

use thiserror::Error;

/// Result type alias for training operations.
pub type Result<T> = std::result::Result<T, TrainError>;

/// Errors that can occur during training.
#[derive(Error, Debug)]
pub enum TrainError {
    /// A training or validation batch had no labels.
    #[error("Batch from the {0} split has no labels")]
    MissingTargets(txai_core::Split),

    /// Invalid learning rate.
    #[error("Invalid learning rate: {0}")]
    InvalidLearningRate(String),

    /// Invalid trainer configuration.
    #[error("Invalid trainer configuration: {0}")]
    InvalidConfig(String),

    /// Loss became NaN or infinite.
    #[error("Loss diverged at epoch {epoch}: {loss}")]
    Diverged {
        /// Epoch index.
        epoch: usize,
        /// Offending loss value.
        loss: f32,
    },

    /// Metric inputs did not line up.
    #[error("Metric error: {0}")]
    MetricError(String),

    /// Data error.
    #[error("Data error: {0}")]
    DataError(#[from] txai_data::DataError),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] txai_core::CoreError),
}
