//! # txai_models
//!
//! Models used by the txai experiments.
//!
//! ## Classifiers
//! - [`StateClassifier`] - GRU, LSTM or causal CONV stack emitting logits at
//!   every timestep
//!
//! ## Generators
//! - [`FeatureGenerator`] - conditional Gaussian predictor of the next
//!   observations of each feature, used to draw counterfactuals
//!
//! ## Checkpoints
//! - [`checkpoint`] - `{stem}.mpk` records with `{stem}.json` metadata

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod classifier;
pub mod generator;

pub use checkpoint::{
    checkpoint_exists, expect_kind, load_record, metadata_path, record_path, save_model,
    CheckpointError, CheckpointMetadata, ModelCheckpoint,
};
pub use classifier::{ModelType, StateClassifier, StateClassifierConfig};
pub use generator::{
    FeatureGenerator, FeatureGeneratorConfig, GaussianHead, GaussianParams, GeneratorKind,
};

/// Metadata kind of classifier checkpoints.
pub const CLASSIFIER_KIND: &str = "classifier";
/// Metadata kind of generator checkpoints.
pub const GENERATOR_KIND: &str = "generator";
