//! Counterfactual sources for perturbation-based explainers.
//!
//! A sampler replaces the window `x[.., .., start..start + horizon]` of a
//! batch with plausible values, drawn either from a trained
//! [`FeatureGenerator`] conditioned on the history `x[.., .., ..start]` or
//! from reference (training) series.

use burn::prelude::*;
use ndarray::{s, Array3, Array4};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution as _, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::{ExplainError, Result};
use txai_core::{array3_to_tensor, tensor_to_array3};
use txai_models::FeatureGenerator;

/// Where counterfactual values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterfactualOrigin {
    /// A trained conditional generator.
    Generator,
    /// Time-aligned windows of reference series, as configured.
    DataDistribution,
    /// Reference series used because no generator checkpoint was found.
    MarginalFallback,
}

impl std::fmt::Display for CounterfactualOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CounterfactualOrigin::Generator => "generator",
            CounterfactualOrigin::DataDistribution => "data_distribution",
            CounterfactualOrigin::MarginalFallback => "marginal_fallback",
        })
    }
}

/// Source of counterfactual windows.
pub trait CounterfactualSampler {
    /// Draw `n_samples` replacements for `x[.., .., start..start + horizon]`.
    ///
    /// Returns `(n_samples, N, V, horizon)`.
    fn sample(
        &self,
        x: &Array3<f32>,
        start: usize,
        horizon: usize,
        n_samples: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<Array4<f32>>;

    /// Origin recorded on explanations.
    fn origin(&self) -> CounterfactualOrigin;
}

/// How reference values are picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginalMode {
    /// Any series, any timestep, independently per cell.
    Pooled,
    /// One random series per draw, same timesteps as the window.
    TimeAligned,
}

/// Draws counterfactuals from reference series.
#[derive(Debug, Clone)]
pub struct MarginalSampler {
    reference: Array3<f32>,
    mode: MarginalMode,
    origin: CounterfactualOrigin,
}

impl MarginalSampler {
    /// Sampler over reference series `(M, V, L)`.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::InvalidShape`] for an empty reference.
    pub fn new(reference: Array3<f32>, mode: MarginalMode) -> Result<Self> {
        if reference.is_empty() {
            return Err(ExplainError::InvalidShape(
                "reference data for marginal sampling is empty".to_string(),
            ));
        }
        Ok(Self {
            reference,
            mode,
            origin: CounterfactualOrigin::DataDistribution,
        })
    }

    /// Mark the sampler as a stand-in for a missing generator.
    #[must_use]
    pub fn as_fallback(mut self) -> Self {
        self.origin = CounterfactualOrigin::MarginalFallback;
        self
    }

    /// Sampling mode.
    #[must_use]
    pub fn mode(&self) -> MarginalMode {
        self.mode
    }
}

impl CounterfactualSampler for MarginalSampler {
    fn sample(
        &self,
        x: &Array3<f32>,
        start: usize,
        horizon: usize,
        n_samples: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<Array4<f32>> {
        let (n, n_vars, _) = x.dim();
        let (m, ref_vars, ref_len) = self.reference.dim();
        if ref_vars != n_vars {
            return Err(ExplainError::InvalidShape(format!(
                "reference has {ref_vars} features, input has {n_vars}"
            )));
        }

        let mut out = Array4::<f32>::zeros((n_samples, n, n_vars, horizon));
        for mut draw in out.outer_iter_mut() {
            for mut series in draw.outer_iter_mut() {
                match self.mode {
                    MarginalMode::TimeAligned => {
                        let j = rng.gen_range(0..m);
                        for f in 0..n_vars {
                            for h in 0..horizon {
                                let t = (start + h).min(ref_len - 1);
                                series[[f, h]] = self.reference[[j, f, t]];
                            }
                        }
                    }
                    MarginalMode::Pooled => {
                        for f in 0..n_vars {
                            for h in 0..horizon {
                                let j = rng.gen_range(0..m);
                                let t = rng.gen_range(0..ref_len);
                                series[[f, h]] = self.reference[[j, f, t]];
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn origin(&self) -> CounterfactualOrigin {
        self.origin
    }
}

/// Draws counterfactuals from a trained generator.
#[derive(Debug, Clone)]
pub struct GeneratorSampler<B: Backend> {
    generator: FeatureGenerator<B>,
    device: B::Device,
}

impl<B: Backend> GeneratorSampler<B> {
    /// Wrap a generator.
    pub fn new(generator: FeatureGenerator<B>, device: B::Device) -> Self {
        Self { generator, device }
    }
}

impl<B: Backend> CounterfactualSampler for GeneratorSampler<B> {
    fn sample(
        &self,
        x: &Array3<f32>,
        start: usize,
        horizon: usize,
        n_samples: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<Array4<f32>> {
        if horizon > self.generator.horizon() {
            return Err(ExplainError::HorizonTooLong {
                requested: horizon,
                available: self.generator.horizon(),
            });
        }
        let (n, n_vars, _) = x.dim();
        let params = if start == 0 {
            self.generator.forward_empty(n, &self.device)
        } else {
            let history = x.slice(s![.., .., ..start]).to_owned();
            self.generator
                .forward(array3_to_tensor::<B>(&history, &self.device))
        }
        .truncate(horizon);
        let mean = tensor_to_array3(params.mean)?;
        let std = tensor_to_array3(params.log_std)?.mapv(f32::exp);

        let mut out = Array4::<f32>::zeros((n_samples, n, n_vars, horizon));
        for mut draw in out.outer_iter_mut() {
            draw.indexed_iter_mut().for_each(|(idx, value)| {
                let z: f32 = StandardNormal.sample(rng);
                *value = mean[idx] + std[idx] * z;
            });
        }
        Ok(out)
    }

    fn origin(&self) -> CounterfactualOrigin {
        CounterfactualOrigin::Generator
    }
}
