//! Pipeline error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while running an experiment.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The YAML config could not be parsed.
    #[error("Invalid config {path}: {source}")]
    Config {
        /// Config file.
        path: PathBuf,
        /// Parse error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A config value is out of range or inconsistent.
    #[error("Invalid config value: {0}")]
    InvalidConfig(String),

    /// A step needs the classifier but none was trained or loaded.
    #[error("No classifier available; train one or load a checkpoint first")]
    NoClassifier,

    /// The importance file of an explainer does not exist.
    #[error("Importance file not found: {0}")]
    MissingImportance(PathBuf),

    /// Core error.
    #[error(transparent)]
    Core(#[from] txai_core::CoreError),

    /// Data error.
    #[error(transparent)]
    Data(#[from] txai_data::DataError),

    /// Checkpoint error.
    #[error(transparent)]
    Checkpoint(#[from] txai_models::CheckpointError),

    /// Training error.
    #[error(transparent)]
    Train(#[from] txai_train::TrainError),

    /// Explainer error.
    #[error(transparent)]
    Explain(#[from] txai_explain::ExplainError),

    /// Evaluation error.
    #[error(transparent)]
    Eval(#[from] txai_eval::EvalError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
