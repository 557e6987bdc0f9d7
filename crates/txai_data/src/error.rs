//! Error types for txai_data.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised while loading, splitting or batching data.
#[derive(Error, Debug)]
pub enum DataError {
    /// Arrays with inconsistent shapes.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// Dataset has no samples.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// Index out of bounds.
    #[error("Index {index} out of bounds for length {length}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The length of the collection.
        length: usize,
    },

    /// Batch size error.
    #[error("Invalid batch size: {0}")]
    InvalidBatchSize(String),

    /// Split error.
    #[error("Split error: {0}")]
    SplitError(String),

    /// A required file does not exist.
    #[error("Missing data file {0}")]
    MissingFile(PathBuf),

    /// File format error.
    #[error("File format error in {path}: {message}")]
    FormatError {
        /// File being read or written.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Unknown dataset name.
    #[error("Unknown dataset {0:?}")]
    UnknownDataset(String),

    /// Labels that are not non-negative integers.
    #[error("Invalid label {0}: labels must be non-negative class indices")]
    InvalidLabel(f32),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] txai_core::CoreError),
}

impl DataError {
    pub(crate) fn format(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::FormatError {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
