//! # txai_explain
//!
//! Post-hoc explainers for sequence classifiers.
//!
//! This crate provides:
//! - [`WinIT`], windowed importance from counterfactual divergences
//! - Feature Occlusion and Augmented Feature Occlusion ([`Occlusion`])
//! - Integrated Gradients and Input × Gradient ([`GradientExplainer`])
//! - Counterfactual samplers backed by generators or training data
//! - [`ImportanceMap`] / [`WindowedScores`] and their aggregation
//!
//! Explainers talk to models through the [`Predictor`] trait, so the
//! numerical core works on `ndarray` arrays.
//!
//! ## Example
//!
//! ```rust,ignore
//! use txai_explain::{MarginalMode, MarginalSampler, WinIT, WinITConfig};
//!
//! let sampler = MarginalSampler::new(train_x, MarginalMode::TimeAligned)?;
//! let winit = WinIT::new(WinITConfig::new(10), Box::new(sampler))?;
//! let scores = winit.attribute(&predictor, &test_x)?;
//! let importance = scores.aggregate(Aggregation::Mean);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod divergence;
mod error;
mod explainer;
mod gradient;
mod importance;
mod occlusion;
mod predictor;
mod sampler;
mod winit;

pub use divergence::{Divergence, EPS};
pub use error::{ExplainError, Result};
pub use explainer::{Explainer, ExplainerKind, ExplainerSettings, ExplainerSpec, Explanation};
pub use gradient::{
    input_gradient, integrated_gradients, GradientExplainer, GradientMethod,
    IntegratedGradientsConfig,
};
pub use importance::{Aggregation, ImportanceMap, WindowedScores};
pub use occlusion::{Occlusion, OcclusionKind};
pub use predictor::{ClassifierPredictor, Predictor};
pub use sampler::{
    CounterfactualOrigin, CounterfactualSampler, GeneratorSampler, MarginalMode, MarginalSampler,
};
pub use winit::{WinIT, WinITConfig};
