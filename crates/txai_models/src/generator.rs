//! Conditional Gaussian feature generators.
//!
//! A generator looks at the history `x[.., .., ..t]` of a batch and predicts
//! a diagonal Gaussian over the next `horizon` observations of every feature.
//! Explainers draw counterfactual values for a window from it.
//!
//! Two layouts are supported:
//! - [`GeneratorKind::Joint`]: one GRU encoder and one head for all features.
//! - [`GeneratorKind::PerFeature`]: one encoder and head per feature, each
//!   still conditioned on the full multivariate history.

use burn::nn::{
    gru::{Gru, GruConfig},
    Linear, LinearConfig,
};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// Lower bound of the predicted log standard deviation.
pub const MIN_LOG_STD: f64 = -5.0;
/// Upper bound of the predicted log standard deviation.
pub const MAX_LOG_STD: f64 = 2.0;

/// Generator layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    /// One model for all features.
    #[default]
    Joint,
    /// One model per feature.
    PerFeature,
}

impl std::fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratorKind::Joint => f.write_str("joint"),
            GeneratorKind::PerFeature => f.write_str("per_feature"),
        }
    }
}

/// Configuration of a [`FeatureGenerator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureGeneratorConfig {
    /// Number of features.
    pub n_vars: usize,
    /// Encoder width.
    pub hidden_size: usize,
    /// Number of future steps predicted.
    pub horizon: usize,
    /// Joint or per-feature layout.
    pub kind: GeneratorKind,
    /// Condition on the history; when false the encoding is always zero.
    pub conditional: bool,
}

impl FeatureGeneratorConfig {
    /// Config for `n_vars` features and a `horizon`-step window.
    pub fn new(n_vars: usize, horizon: usize) -> Self {
        Self {
            n_vars,
            hidden_size: 50,
            horizon: horizon.max(1),
            kind: GeneratorKind::Joint,
            conditional: true,
        }
    }

    /// Set the encoder width.
    #[must_use]
    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    /// Set the layout.
    #[must_use]
    pub fn with_kind(mut self, kind: GeneratorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Enable or disable history conditioning.
    #[must_use]
    pub fn with_conditional(mut self, conditional: bool) -> Self {
        self.conditional = conditional;
        self
    }

    /// Initialize the generator.
    pub fn init<B: Backend>(&self, device: &B::Device) -> FeatureGenerator<B> {
        let (n_heads, out_vars) = match self.kind {
            GeneratorKind::Joint => (1, self.n_vars),
            GeneratorKind::PerFeature => (self.n_vars, 1),
        };
        let heads = (0..n_heads)
            .map(|_| GaussianHead {
                encoder: GruConfig::new(self.n_vars, self.hidden_size, true).init(device),
                mean: LinearConfig::new(self.hidden_size, out_vars * self.horizon).init(device),
                log_std: LinearConfig::new(self.hidden_size, out_vars * self.horizon).init(device),
                out_vars,
            })
            .collect();

        FeatureGenerator {
            heads,
            n_vars: self.n_vars,
            hidden_size: self.hidden_size,
            horizon: self.horizon,
            conditional: self.conditional,
        }
    }
}

/// Encoder plus mean and log-std projections for some features.
#[derive(Module, Debug)]
pub struct GaussianHead<B: Backend> {
    encoder: Gru<B>,
    mean: Linear<B>,
    log_std: Linear<B>,
    out_vars: usize,
}

impl<B: Backend> GaussianHead<B> {
    fn encode(&self, history: Tensor<B, 3>) -> Tensor<B, 2> {
        // (B, V, T) -> (B, T, V) -> last hidden state (B, H)
        let out = self.encoder.forward(history.swap_dims(1, 2), None);
        let [batch, steps, hidden] = out.dims();
        out.slice([0..batch, steps - 1..steps, 0..hidden])
            .reshape([batch, hidden])
    }

    fn project(&self, encoding: Tensor<B, 2>, horizon: usize) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let batch = encoding.dims()[0];
        let mean = self
            .mean
            .forward(encoding.clone())
            .reshape([batch, self.out_vars, horizon]);
        let log_std = self
            .log_std
            .forward(encoding)
            .clamp(MIN_LOG_STD, MAX_LOG_STD)
            .reshape([batch, self.out_vars, horizon]);
        (mean, log_std)
    }
}

/// Gaussian parameters `(B, V, horizon)` predicted by a generator.
#[derive(Debug, Clone)]
pub struct GaussianParams<B: Backend> {
    /// Mean of every future observation.
    pub mean: Tensor<B, 3>,
    /// Log standard deviation of every future observation.
    pub log_std: Tensor<B, 3>,
}

impl<B: Backend> GaussianParams<B> {
    /// Keep the first `steps` predicted steps.
    pub fn truncate(self, steps: usize) -> Self {
        let [batch, vars, horizon] = self.mean.dims();
        let steps = steps.min(horizon);
        Self {
            mean: self.mean.slice([0..batch, 0..vars, 0..steps]),
            log_std: self.log_std.slice([0..batch, 0..vars, 0..steps]),
        }
    }

    /// Mean Gaussian negative log likelihood of `target (B, V, S)`.
    ///
    /// Only the first `S` predicted steps are scored.
    pub fn nll(self, target: Tensor<B, 3>) -> Tensor<B, 1> {
        let steps = target.dims()[2];
        let params = self.truncate(steps);
        let z = (target - params.mean) / params.log_std.clone().exp();
        let per_cell = z.powf_scalar(2.0).mul_scalar(0.5)
            + params.log_std
            + 0.5 * (2.0 * std::f64::consts::PI).ln();
        per_cell.mean()
    }
}

/// Predicts future observations of every feature from a history.
#[derive(Module, Debug)]
pub struct FeatureGenerator<B: Backend> {
    heads: Vec<GaussianHead<B>>,
    n_vars: usize,
    hidden_size: usize,
    horizon: usize,
    conditional: bool,
}

impl<B: Backend> FeatureGenerator<B> {
    /// Number of predicted steps.
    #[must_use]
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Number of features.
    #[must_use]
    pub fn n_vars(&self) -> usize {
        self.n_vars
    }

    /// Predict from a non-empty history `(B, V, T)`.
    pub fn forward(&self, history: Tensor<B, 3>) -> GaussianParams<B> {
        let [batch, _, steps] = history.dims();
        if steps == 0 || !self.conditional {
            return self.forward_empty(batch, &history.device());
        }
        let mut means = Vec::with_capacity(self.heads.len());
        let mut log_stds = Vec::with_capacity(self.heads.len());
        for head in &self.heads {
            let (mean, log_std) = head.project(head.encode(history.clone()), self.horizon);
            means.push(mean);
            log_stds.push(log_std);
        }
        GaussianParams {
            mean: Tensor::cat(means, 1),
            log_std: Tensor::cat(log_stds, 1),
        }
    }

    /// Predict with no history (series start or unconditional generator).
    pub fn forward_empty(&self, batch: usize, device: &B::Device) -> GaussianParams<B> {
        let encoding = Tensor::<B, 2>::zeros([batch, self.hidden_size], device);
        let mut means = Vec::with_capacity(self.heads.len());
        let mut log_stds = Vec::with_capacity(self.heads.len());
        for head in &self.heads {
            let (mean, log_std) = head.project(encoding.clone(), self.horizon);
            means.push(mean);
            log_stds.push(log_std);
        }
        GaussianParams {
            mean: Tensor::cat(means, 1),
            log_std: Tensor::cat(log_stds, 1),
        }
    }

    /// Training loss for split point `t` of `x (B, V, L)`.
    ///
    /// Conditions on `x[.., .., ..t]` and scores `x[.., .., t..t + horizon]`,
    /// truncated at the series end.
    pub fn loss_at(&self, x: Tensor<B, 3>, t: usize) -> Tensor<B, 1> {
        let [batch, vars, len] = x.dims();
        let t = t.min(len.saturating_sub(1));
        let end = (t + self.horizon).min(len);
        let params = if t == 0 {
            self.forward_empty(batch, &x.device())
        } else {
            self.forward(x.clone().slice([0..batch, 0..vars, 0..t]))
        };
        params.nll(x.slice([0..batch, 0..vars, t..end]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        for kind in [GeneratorKind::Joint, GeneratorKind::PerFeature] {
            let gen = FeatureGeneratorConfig::new(3, 4)
                .with_hidden_size(6)
                .with_kind(kind)
                .init::<TestBackend>(&device);
            let history = Tensor::<TestBackend, 3>::random([2, 3, 5], Distribution::Default, &device);
            let params = gen.forward(history);
            assert_eq!(params.mean.dims(), [2, 3, 4]);
            assert_eq!(params.log_std.dims(), [2, 3, 4]);

            let empty = gen.forward_empty(2, &device);
            assert_eq!(empty.mean.dims(), [2, 3, 4]);
        }
    }

    #[test]
    fn test_log_std_is_clamped() {
        let device = Default::default();
        let gen = FeatureGeneratorConfig::new(2, 3).init::<TestBackend>(&device);
        let history = Tensor::<TestBackend, 3>::ones([1, 2, 4], &device).mul_scalar(1e4);
        let log_std: Vec<f32> = gen.forward(history).log_std.into_data().to_vec().unwrap();
        assert!(log_std
            .iter()
            .all(|v| (*v as f64) >= MIN_LOG_STD - 1e-6 && (*v as f64) <= MAX_LOG_STD + 1e-6));
    }

    #[test]
    fn test_unconditional_ignores_history() {
        let device = Default::default();
        let gen = FeatureGeneratorConfig::new(2, 2)
            .with_conditional(false)
            .init::<TestBackend>(&device);
        let a = gen.forward(Tensor::zeros([1, 2, 3], &device)).mean;
        let b = gen.forward(Tensor::ones([1, 2, 3], &device)).mean;
        let diff: f32 = (a - b).abs().sum().into_scalar().elem();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn test_loss_truncates_at_series_end() {
        let device = Default::default();
        let gen = FeatureGeneratorConfig::new(2, 4).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 3>::random([3, 2, 6], Distribution::Default, &device);
        for t in [0, 3, 5] {
            let loss: f32 = gen.loss_at(x.clone(), t).into_scalar().elem();
            assert!(loss.is_finite());
        }
    }
}
