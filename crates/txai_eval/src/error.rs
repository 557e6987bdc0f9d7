//! Error types for evaluation.

use thiserror::Error;

/// Result type alias using [`EvalError`].
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors raised while masking, scoring or writing results.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Masker settings that cannot be combined.
    #[error("Invalid masker: {0}")]
    InvalidMasker(String),

    /// Mask method, mode or direction that cannot be parsed.
    #[error("Unknown option {value:?} for {what}")]
    UnknownOption {
        /// Kind of option.
        what: &'static str,
        /// Offending value.
        value: String,
    },

    /// Arrays with inconsistent shapes.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// Test split without labels or ground truth.
    #[error("Missing {0}")]
    Missing(&'static str),

    /// Metric computation failed.
    #[error("Metric error: {0}")]
    Metric(#[from] txai_train::TrainError),

    /// Explainer error.
    #[error("Explainer error: {0}")]
    Explain(#[from] txai_explain::ExplainError),

    /// Data error.
    #[error("Data error: {0}")]
    Data(#[from] txai_data::DataError),

    /// Results table error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
