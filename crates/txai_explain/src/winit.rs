//! Windowed importance scoring.
//!
//! For every prediction step `t` and look-back `n < min(t, W)`, feature `f`
//! on `[t - n, t]` is replaced by counterfactual draws and the divergence
//! between the original and perturbed predictions at `t` is measured.
//! Differencing over `n` isolates the contribution of the single step
//! `t - n`.

use ndarray::{s, Array3, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::divergence::{mean_divergence, Divergence};
use crate::error::{ExplainError, Result};
use crate::importance::WindowedScores;
use crate::predictor::Predictor;
use crate::sampler::{CounterfactualOrigin, CounterfactualSampler};

/// WinIT settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WinITConfig {
    /// Look-back window `W`.
    pub window: usize,
    /// Divergence between original and counterfactual predictions.
    pub metric: Divergence,
    /// Counterfactual draws per perturbation.
    pub n_samples: usize,
    /// Seed of the sampling RNG.
    pub seed: u64,
    /// One generator over all features instead of one per feature.
    pub joint: bool,
    /// Condition the generator on the history.
    pub conditional: bool,
    /// Draw counterfactuals from the training data instead of a generator.
    pub use_data_distribution: bool,
}

impl Default for WinITConfig {
    fn default() -> Self {
        Self {
            window: 10,
            metric: Divergence::Pd,
            n_samples: 3,
            seed: 2021,
            joint: false,
            conditional: true,
            use_data_distribution: false,
        }
    }
}

impl WinITConfig {
    /// Config with window `W`.
    pub fn new(window: usize) -> Self {
        Self {
            window,
            ..Default::default()
        }
    }

    /// Set the divergence.
    pub fn with_metric(mut self, metric: Divergence) -> Self {
        self.metric = metric;
        self
    }

    /// Set the number of draws.
    pub fn with_n_samples(mut self, n_samples: usize) -> Self {
        self.n_samples = n_samples;
        self
    }

    /// Set the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Use a joint generator.
    pub fn with_joint(mut self, joint: bool) -> Self {
        self.joint = joint;
        self
    }

    /// Use a conditional generator.
    pub fn with_conditional(mut self, conditional: bool) -> Self {
        self.conditional = conditional;
        self
    }

    /// Sample from the data distribution.
    pub fn with_data_distribution(mut self, use_data_distribution: bool) -> Self {
        self.use_data_distribution = use_data_distribution;
        self
    }

    /// Explainer name, e.g. `winit_w10_pd_joint`.
    pub fn name(&self) -> String {
        let mut name = format!("winit_w{}_{}", self.window, self.metric);
        if self.joint {
            name.push_str("_joint");
        }
        if self.use_data_distribution {
            name.push_str("_datadist");
        }
        if !self.conditional {
            name.push_str("_uncond");
        }
        name
    }

    fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(ExplainError::InvalidConfig("window must be positive".to_string()));
        }
        if self.n_samples == 0 {
            return Err(ExplainError::InvalidConfig(
                "n_samples must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// WinIT explainer over a counterfactual sampler.
pub struct WinIT {
    config: WinITConfig,
    sampler: Box<dyn CounterfactualSampler>,
}

impl std::fmt::Debug for WinIT {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WinIT")
            .field("config", &self.config)
            .field("origin", &self.sampler.origin())
            .finish()
    }
}

impl WinIT {
    /// Build the explainer.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::InvalidConfig`] for a zero window or sample count.
    pub fn new(config: WinITConfig, sampler: Box<dyn CounterfactualSampler>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, sampler })
    }

    /// The configuration.
    pub fn config(&self) -> &WinITConfig {
        &self.config
    }

    /// Where counterfactuals come from.
    pub fn origin(&self) -> CounterfactualOrigin {
        self.sampler.origin()
    }

    /// Score every `(series, step, feature, look-back)` of `x (N, V, L)`.
    ///
    /// # Errors
    ///
    /// Propagates sampler and predictor failures.
    pub fn attribute<P: Predictor + ?Sized>(
        &self,
        predictor: &P,
        x: &Array3<f32>,
    ) -> Result<WindowedScores> {
        let (n, n_vars, seq_len) = x.dim();
        let window = self.config.window;
        let n_samples = self.config.n_samples;
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut scores = WindowedScores::zeros(n, seq_len, n_vars, window);

        for t in 1..seq_len {
            let prefix = x.slice(s![.., .., ..=t]).to_owned();
            let p = predictor.predict_proba(&prefix)?;
            let reach = t.min(window);

            // iscore[i, f, back]
            let mut iscore = Array3::<f32>::zeros((n, n_vars, reach));
            for back in 0..reach {
                let start = t - back;
                let cf = self
                    .sampler
                    .sample(&prefix, start, back + 1, n_samples, &mut rng)?;

                for f in 0..n_vars {
                    let mut batch = Array3::<f32>::zeros((n_samples * n, n_vars, t + 1));
                    for s_idx in 0..n_samples {
                        let mut block = batch.slice_mut(s![s_idx * n..(s_idx + 1) * n, .., ..]);
                        block.assign(&prefix);
                        block
                            .slice_mut(s![.., f, start..=t])
                            .assign(&cf.slice(s![s_idx, .., f, ..]));
                    }
                    let q = predictor.predict_proba(&batch)?;
                    let div = mean_divergence(self.config.metric, &p, &q, n_samples);
                    iscore.slice_mut(s![.., f, back]).assign(&div);
                }
            }

            for back in (1..reach).rev() {
                let prev = iscore.index_axis(Axis(2), back - 1).to_owned();
                let mut cur = iscore.index_axis_mut(Axis(2), back);
                cur -= &prev;
            }

            let values = scores.values_mut();
            for back in 0..reach {
                values
                    .slice_mut(s![.., t, .., window - 1 - back])
                    .assign(&iscore.index_axis(Axis(2), back));
            }
            tracing::debug!(step = t, reach, "scored prediction step");
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{MarginalMode, MarginalSampler};
    use ndarray::Array2;

    /// Probability of class 1 follows feature 0 at the last step.
    fn last_value_predictor(x: &Array3<f32>) -> Result<Array2<f32>> {
        let (n, _, len) = x.dim();
        Ok(Array2::from_shape_fn((n, 2), |(i, c)| {
            let p1 = 1.0 / (1.0 + (-x[[i, 0, len - 1]]).exp());
            if c == 1 {
                p1
            } else {
                1.0 - p1
            }
        }))
    }

    fn sampler() -> Box<dyn CounterfactualSampler> {
        let reference = Array3::from_shape_fn((6, 2, 5), |(j, f, t)| {
            ((j * 7 + f * 3 + t) % 5) as f32 - 2.0
        });
        Box::new(MarginalSampler::new(reference, MarginalMode::Pooled).unwrap())
    }

    fn input() -> Array3<f32> {
        Array3::from_shape_fn((3, 2, 5), |(i, f, t)| (i as f32 - 1.0) * (f + t) as f32)
    }

    #[test]
    fn test_shape_and_first_step() {
        let explainer = WinIT::new(WinITConfig::new(3), sampler()).unwrap();
        let scores = explainer.attribute(&last_value_predictor, &input()).unwrap();
        assert_eq!(scores.values().dim(), (3, 5, 2, 3));
        assert!(scores.values().slice(s![.., 0, .., ..]).iter().all(|v| *v == 0.0));
        // at t=1 only one step of look-back exists, left-padded
        assert!(scores.values().slice(s![.., 1, .., ..1]).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let config = WinITConfig::new(2).with_metric(Divergence::Kl).with_seed(9);
        let a = WinIT::new(config.clone(), sampler())
            .unwrap()
            .attribute(&last_value_predictor, &input())
            .unwrap();
        let b = WinIT::new(config, sampler())
            .unwrap()
            .attribute(&last_value_predictor, &input())
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unused_feature_scores_zero() {
        let explainer = WinIT::new(WinITConfig::new(2), sampler()).unwrap();
        let scores = explainer.attribute(&last_value_predictor, &input()).unwrap();
        assert!(scores
            .values()
            .slice(s![.., .., 1, ..])
            .iter()
            .all(|v| v.abs() < 1e-6));
        assert!(scores.values().slice(s![.., 1.., 0, 1]).iter().any(|v| *v > 0.0));
    }

    #[test]
    fn test_names_and_validation() {
        assert_eq!(WinITConfig::new(10).name(), "winit_w10_pd");
        let cfg = WinITConfig::new(5)
            .with_metric(Divergence::Js)
            .with_joint(true)
            .with_data_distribution(true)
            .with_conditional(false);
        assert_eq!(cfg.name(), "winit_w5_js_joint_datadist_uncond");
        assert!(WinIT::new(WinITConfig::new(0), sampler()).is_err());
        assert!(WinIT::new(WinITConfig::new(2).with_n_samples(0), sampler()).is_err());
    }
}
