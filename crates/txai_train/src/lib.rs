//! # txai_train
//!
//! Training loops, learning rate schedules and metrics for txai.
//!
//! This crate provides:
//! - [`ClassifierTrainer`] for sequence classifiers with per-step labels
//! - [`GeneratorTrainer`] for conditional feature generators
//! - Learning rate schedulers (constant, one-cycle)
//! - Host-side metrics (AUROC, AUPRC, accuracy, cross-entropy)
//!
//! ## Example
//!
//! ```rust,ignore
//! use txai_train::{ClassifierTrainer, ClassifierTrainerConfig};
//!
//! let trainer = ClassifierTrainer::<TrainBackend>::new(config, device);
//! let output = trainer.fit_with_forward(
//!     model,
//!     &dls,
//!     |m, x, w| m.forward_for_labels(x, w),
//!     |m, x, w| m.forward_for_labels(x, w),
//! )?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod metrics;
pub mod scheduler;
pub mod training;

pub use error::{Result, TrainError};
pub use metrics::{
    accuracy, auprc, auroc, auroc_multiclass, cross_entropy, softmax_rows, ClassificationSummary,
};
pub use scheduler::{ConstantLR, LrSchedule, OneCycleLR, OneCycleLRConfig, Scheduler};
pub use training::{
    evaluate_classifier, ClassifierTrainer, ClassifierTrainerConfig, GeneratorTrainer,
    GeneratorTrainerConfig, GeneratorTrainingOutput, TrainingOutput,
};
