//! Model checkpointing and serialization utilities.
//!
//! A checkpoint is addressed by its *stem*, a path without extension, and is
//! stored as two files next to each other:
//!
//! - `{stem}.mpk`: the Burn record (named MessagePack, full precision)
//! - `{stem}.json`: [`CheckpointMetadata`] with the model config needed to
//!   rebuild the module before loading the record
//!
//! # Example
//!
//! ```rust,ignore
//! use txai_models::checkpoint::{CheckpointMetadata, ModelCheckpoint};
//!
//! let meta = CheckpointMetadata::new("classifier").with_config(&config)?;
//! model.save_checkpoint(&stem, &meta)?;
//!
//! let meta = CheckpointMetadata::load_for(&stem)?;
//! let config: StateClassifierConfig = meta.config()?;
//! let model = config.init::<B>(&device).load_checkpoint(&stem, &device)?;
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Path of the record file for a checkpoint stem.
#[must_use]
pub fn record_path(stem: impl AsRef<Path>) -> PathBuf {
    stem.as_ref().with_extension("mpk")
}

/// Path of the metadata file for a checkpoint stem.
#[must_use]
pub fn metadata_path(stem: impl AsRef<Path>) -> PathBuf {
    stem.as_ref().with_extension("json")
}

/// True when both files of a checkpoint exist.
#[must_use]
pub fn checkpoint_exists(stem: impl AsRef<Path>) -> bool {
    record_path(&stem).is_file() && metadata_path(&stem).is_file()
}

/// Save the weights of `model` under `stem`.
///
/// # Errors
///
/// Returns [`CheckpointError::Save`] if the record cannot be written.
pub fn save_model<B, M>(model: &M, stem: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    let stem = stem.as_ref();
    if let Some(parent) = stem.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    // The recorder adds the `.mpk` extension itself.
    recorder
        .record(model.clone().into_record(), stem.to_path_buf())
        .map_err(|e| CheckpointError::Save(e.to_string()))?;
    Ok(())
}

/// Load the record stored under `stem`.
///
/// # Errors
///
/// Returns [`CheckpointError::Missing`] when the record file does not exist
/// and [`CheckpointError::Load`] when it cannot be decoded.
pub fn load_record<B, M>(stem: impl AsRef<Path>, device: &B::Device) -> Result<M::Record>
where
    B: Backend,
    M: Module<B>,
{
    let stem = stem.as_ref();
    let path = record_path(stem);
    if !path.is_file() {
        return Err(CheckpointError::Missing(path));
    }
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .load(stem.to_path_buf(), device)
        .map_err(|e| CheckpointError::Load(e.to_string()))
}

/// Description of a stored model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// What the checkpoint holds, e.g. `classifier` or `generator`.
    pub kind: String,
    /// Model configuration.
    pub config: serde_json::Value,
    /// Epoch of the saved weights.
    pub best_epoch: Option<usize>,
    /// Validation loss of the saved weights.
    pub best_loss: Option<f32>,
    /// Validation metric of the saved weights (AUROC for classifiers).
    pub best_metric: Option<f32>,
    /// Additional metadata.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl CheckpointMetadata {
    /// Metadata for a model of the given kind.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            config: serde_json::Value::Null,
            best_epoch: None,
            best_loss: None,
            best_metric: None,
            extra: BTreeMap::new(),
        }
    }

    /// Store the model config.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Metadata`] if the config cannot be encoded.
    pub fn with_config<C: Serialize>(mut self, config: &C) -> Result<Self> {
        self.config = serde_json::to_value(config)?;
        Ok(self)
    }

    /// Record the selected epoch and its validation scores.
    #[must_use]
    pub fn with_best(mut self, epoch: usize, loss: f32, metric: Option<f32>) -> Self {
        self.best_epoch = Some(epoch);
        self.best_loss = Some(loss);
        self.best_metric = metric;
        self
    }

    /// Add extra metadata.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Decode the stored model config.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Metadata`] if the stored value does not
    /// match `C`.
    pub fn config<C: DeserializeOwned>(&self) -> Result<C> {
        Ok(serde_json::from_value(self.config.clone())?)
    }

    /// Save to a JSON file.
    ///
    /// # Errors
    ///
    /// Propagates I/O and encoding errors.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Load from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Missing`] for a missing file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(CheckpointError::Missing(path.to_path_buf()));
        }
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    /// Load the metadata belonging to a checkpoint stem.
    ///
    /// # Errors
    ///
    /// See [`CheckpointMetadata::load`].
    pub fn load_for(stem: impl AsRef<Path>) -> Result<Self> {
        Self::load(metadata_path(stem))
    }
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint-related errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Error saving checkpoint.
    #[error("Failed to save checkpoint: {0}")]
    Save(String),

    /// Error loading checkpoint.
    #[error("Failed to load checkpoint: {0}")]
    Load(String),

    /// Checkpoint file does not exist.
    #[error("Checkpoint not found: {0}")]
    Missing(PathBuf),

    /// Metadata has an unexpected kind.
    #[error("Checkpoint kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        /// Expected kind.
        expected: String,
        /// Stored kind.
        found: String,
    },

    /// Metadata could not be encoded or decoded.
    #[error("Invalid checkpoint metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Checkpoint methods for every Burn module.
pub trait ModelCheckpoint<B: Backend>: Module<B> {
    /// Save weights and metadata under `stem`.
    fn save_checkpoint(&self, stem: impl AsRef<Path>, metadata: &CheckpointMetadata) -> Result<()> {
        let stem = stem.as_ref();
        save_model::<B, Self>(self, stem)?;
        metadata.save(metadata_path(stem))?;
        tracing::debug!(stem = %stem.display(), kind = %metadata.kind, "saved checkpoint");
        Ok(())
    }

    /// Load weights stored under `stem` into this module.
    fn load_checkpoint(self, stem: impl AsRef<Path>, device: &B::Device) -> Result<Self>
    where
        Self: Sized,
    {
        let record = load_record::<B, Self>(stem, device)?;
        Ok(self.load_record(record))
    }
}

impl<B: Backend, M: Module<B>> ModelCheckpoint<B> for M {}

/// Load metadata for `stem` and check that it describes a `kind` model.
///
/// # Errors
///
/// Returns [`CheckpointError::KindMismatch`] when the stored kind differs.
pub fn expect_kind(stem: impl AsRef<Path>, kind: &str) -> Result<CheckpointMetadata> {
    let meta = CheckpointMetadata::load_for(stem)?;
    if meta.kind != kind {
        return Err(CheckpointError::KindMismatch {
            expected: kind.to_string(),
            found: meta.kind,
        });
    }
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ModelType, StateClassifierConfig};
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_checkpoint_metadata() {
        let config = StateClassifierConfig::new(3, 2).with_model_type(ModelType::Lstm);
        let meta = CheckpointMetadata::new("classifier")
            .with_config(&config)
            .unwrap()
            .with_best(10, 0.25, Some(0.92))
            .with_extra("dataset", "spike");

        assert_eq!(meta.best_epoch, Some(10));
        assert_eq!(meta.extra.get("dataset"), Some(&"spike".to_string()));
        let restored: StateClassifierConfig = meta.config().unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_paths_from_stem() {
        let stem = Path::new("ckpt/gru1layer/spike/classifier_cv0");
        assert_eq!(record_path(stem), Path::new("ckpt/gru1layer/spike/classifier_cv0.mpk"));
        assert_eq!(metadata_path(stem), Path::new("ckpt/gru1layer/spike/classifier_cv0.json"));
    }

    #[test]
    fn test_classifier_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("gru1layer/spike/classifier_cv0");
        let device = Default::default();
        let config = StateClassifierConfig::new(2, 2)
            .with_hidden_size(4)
            .with_dropout(0.0);
        let model = config.init::<TestBackend>(&device);
        let meta = CheckpointMetadata::new("classifier").with_config(&config).unwrap();
        model.save_checkpoint(&stem, &meta).unwrap();
        assert!(checkpoint_exists(&stem));

        let meta = expect_kind(&stem, "classifier").unwrap();
        let config: StateClassifierConfig = meta.config().unwrap();
        let loaded = config
            .init::<TestBackend>(&device)
            .load_checkpoint(&stem, &device)
            .unwrap();

        let x = Tensor::<TestBackend, 3>::random([2, 2, 5], Distribution::Default, &device);
        let diff: f32 = (model.forward(x.clone()) - loaded.forward(x))
            .abs()
            .max()
            .into_scalar()
            .elem();
        assert!(diff < 1e-6);
    }

    #[test]
    fn test_missing_and_mismatched_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("nothing");
        assert!(matches!(
            CheckpointMetadata::load_for(&stem),
            Err(CheckpointError::Missing(_))
        ));

        CheckpointMetadata::new("generator")
            .save(metadata_path(&stem))
            .unwrap();
        assert!(matches!(
            expect_kind(&stem, "classifier"),
            Err(CheckpointError::KindMismatch { .. })
        ));
    }
}
