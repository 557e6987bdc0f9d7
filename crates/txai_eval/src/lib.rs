//! # txai_eval
//!
//! Evaluation of time-series explanations.
//!
//! This crate provides:
//! - [`Masker`], which substitutes the most important observations
//! - [`PerformanceDrop`], the classifier's degradation on masked series
//! - Ground-truth AUROC/AUPRC for datasets with known saliency
//! - [`ResultsTable`], the append-only CSV of every evaluated run
//!
//! ## Example
//!
//! ```rust,ignore
//! use txai_eval::{MaskMethod, Masker, MaskerConfig, PerformanceDrop, TopK};
//!
//! let drop = PerformanceDrop::new(&predictor, &test_x, &labels)?;
//! let masker = Masker::new(MaskerConfig::new(MaskMethod::Std, TopK::Count(5)))?;
//! let outcome = masker.mask_explanation(&test_x, &explanation)?;
//! let metrics = drop.evaluate(&predictor, &outcome)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod drop;
mod error;
mod groundtruth;
mod masker;
mod results;

pub use drop::{DropMetrics, PerformanceDrop};
pub use error::{EvalError, Result};
pub use groundtruth::{evaluate_ground_truth, score_against_ground_truth, GroundTruthMetrics};
pub use masker::{
    Direction, MaskMethod, MaskOutcome, Masker, MaskerConfig, SubstitutionMode, TopK,
    IMPORTANCE_THRESHOLD,
};
pub use results::{ResultRow, ResultsTable, RowKey, DATE_FORMAT};
