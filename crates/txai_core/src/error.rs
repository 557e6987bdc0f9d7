//! Error types for txai_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors raised while building batches and reading tensors.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Shape mismatch between tensors.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A tensor could not be read back into host memory.
    #[error("Tensor data error: {0}")]
    TensorData(String),

    /// Unparseable value for the deterministic-mode environment variable.
    #[error("Invalid value {value:?} for {var}: expected one of 1/0, true/false, on/off")]
    InvalidEnvFlag {
        /// Name of the environment variable.
        var: String,
        /// The offending value.
        value: String,
    },
}
