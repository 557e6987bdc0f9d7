//! Causal sequence classifiers (GRU, LSTM, CONV).
//!
//! Every variant emits class logits at every timestep and only looks at the
//! past, so the logits at step `t` of a full series equal the last-step
//! logits of the prefix `x[.., ..=t]`. Explainers rely on this to score
//! truncated series.

use std::str::FromStr;

use burn::nn::{
    conv::{Conv1d, Conv1dConfig},
    gru::{Gru, GruConfig},
    lstm::{Lstm, LstmConfig},
    Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig1d, Relu,
};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use serde::{Deserialize, Serialize};

/// Classifier family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelType {
    /// Stacked GRU.
    #[default]
    Gru,
    /// Stacked LSTM.
    Lstm,
    /// Stacked causal 1D convolutions.
    Conv,
}

impl ModelType {
    /// Directory name used for checkpoints and outputs.
    ///
    /// ```rust
    /// use txai_models::ModelType;
    ///
    /// assert_eq!(ModelType::Gru.dir_name(2), "gru2layer");
    /// assert_eq!(ModelType::Lstm.dir_name(2), "lstm");
    /// ```
    #[must_use]
    pub fn dir_name(&self, num_layers: usize) -> String {
        match self {
            ModelType::Gru => format!("gru{num_layers}layer"),
            ModelType::Lstm => "lstm".to_string(),
            ModelType::Conv => "conv".to_string(),
        }
    }

    /// Upper-case name as written to results tables.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ModelType::Gru => "GRU",
            ModelType::Lstm => "LSTM",
            ModelType::Conv => "CONV",
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GRU" => Ok(ModelType::Gru),
            "LSTM" => Ok(ModelType::Lstm),
            "CONV" | "CNN" => Ok(ModelType::Conv),
            other => Err(format!("Unknown model type ({other})")),
        }
    }
}

/// Configuration of a [`StateClassifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateClassifierConfig {
    /// Number of input features.
    pub n_vars: usize,
    /// Number of classes.
    pub n_classes: usize,
    /// Width of every hidden layer.
    pub hidden_size: usize,
    /// Number of stacked layers.
    pub num_layers: usize,
    /// Dropout between layers and before the head.
    pub dropout: f64,
    /// Classifier family.
    pub model_type: ModelType,
    /// Kernel size of the CONV variant.
    pub kernel_size: usize,
}

impl Default for StateClassifierConfig {
    fn default() -> Self {
        Self {
            n_vars: 3,
            n_classes: 2,
            hidden_size: 200,
            num_layers: 1,
            dropout: 0.5,
            model_type: ModelType::Gru,
            kernel_size: 3,
        }
    }
}

impl StateClassifierConfig {
    /// Config for `n_vars` features and `n_classes` classes.
    pub fn new(n_vars: usize, n_classes: usize) -> Self {
        Self {
            n_vars,
            n_classes,
            ..Default::default()
        }
    }

    /// Set the classifier family.
    #[must_use]
    pub fn with_model_type(mut self, model_type: ModelType) -> Self {
        self.model_type = model_type;
        self
    }

    /// Set the hidden width.
    #[must_use]
    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    /// Set the number of layers.
    #[must_use]
    pub fn with_num_layers(mut self, num_layers: usize) -> Self {
        self.num_layers = num_layers;
        self
    }

    /// Set the dropout rate.
    #[must_use]
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> StateClassifier<B> {
        StateClassifier::new(self, device)
    }
}

/// Causal classifier emitting logits at every timestep.
///
/// ```text
/// x (B, V, L) -> [GRU | LSTM | causal Conv+ReLU] x num_layers -> Dropout -> Linear
///             -> logits (B, L, C)
/// ```
#[derive(Module, Debug)]
pub struct StateClassifier<B: Backend> {
    grus: Vec<Gru<B>>,
    lstms: Vec<Lstm<B>>,
    convs: Vec<Conv1d<B>>,
    dropout: Dropout,
    head: Linear<B>,
    causal_padding: usize,
}

impl<B: Backend> StateClassifier<B> {
    /// Create a model from its config.
    pub fn new(config: &StateClassifierConfig, device: &B::Device) -> Self {
        let layers = config.num_layers.max(1);
        let input_width = |layer: usize| if layer == 0 { config.n_vars } else { config.hidden_size };

        let mut grus = Vec::new();
        let mut lstms = Vec::new();
        let mut convs = Vec::new();
        let causal_padding = config.kernel_size.saturating_sub(1);

        for layer in 0..layers {
            match config.model_type {
                ModelType::Gru => grus.push(
                    GruConfig::new(input_width(layer), config.hidden_size, true).init(device),
                ),
                ModelType::Lstm => lstms.push(
                    LstmConfig::new(input_width(layer), config.hidden_size, true).init(device),
                ),
                ModelType::Conv => convs.push(
                    Conv1dConfig::new(input_width(layer), config.hidden_size, config.kernel_size)
                        .with_padding(PaddingConfig1d::Explicit(causal_padding))
                        .init(device),
                ),
            }
        }

        Self {
            grus,
            lstms,
            convs,
            dropout: DropoutConfig::new(config.dropout).init(),
            head: LinearConfig::new(config.hidden_size, config.n_classes).init(device),
            causal_padding,
        }
    }

    /// Logits at every step, `(B, V, L) -> (B, L, C)`.
    pub fn forward_steps(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, _, seq_len] = x.dims();

        let hidden = if !self.convs.is_empty() {
            let mut h = x;
            for conv in &self.convs {
                let out = conv.forward(h);
                let channels = out.dims()[1];
                // Explicit padding adds context on both sides; keep the causal part.
                h = Relu::new().forward(out.slice([0..batch, 0..channels, 0..seq_len]));
                h = self.dropout.forward(h);
            }
            h.swap_dims(1, 2)
        } else if !self.lstms.is_empty() {
            let mut h = x.swap_dims(1, 2);
            for (i, lstm) in self.lstms.iter().enumerate() {
                let (out, _state) = lstm.forward(h, None);
                h = if i + 1 < self.lstms.len() {
                    self.dropout.forward(out)
                } else {
                    out
                };
            }
            h
        } else {
            let mut h = x.swap_dims(1, 2);
            for (i, gru) in self.grus.iter().enumerate() {
                let out = gru.forward(h, None);
                h = if i + 1 < self.grus.len() {
                    self.dropout.forward(out)
                } else {
                    out
                };
            }
            h
        };

        self.head.forward(self.dropout.forward(hidden))
    }

    /// Logits at the last step, `(B, V, L) -> (B, C)`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        let logits = self.forward_steps(x);
        let [batch, seq_len, classes] = logits.dims();
        logits
            .slice([0..batch, seq_len - 1..seq_len, 0..classes])
            .reshape([batch, classes])
    }

    /// Class probabilities at the last step.
    pub fn forward_probs(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    /// Logits aligned with `(B, W)` labels.
    ///
    /// `W = 1` selects the last step, `W = L` keeps every step.
    pub fn forward_for_labels(&self, x: Tensor<B, 3>, label_width: usize) -> Tensor<B, 3> {
        let logits = self.forward_steps(x);
        let [batch, seq_len, classes] = logits.dims();
        if label_width >= seq_len {
            logits
        } else {
            logits.slice([0..batch, seq_len - label_width..seq_len, 0..classes])
        }
    }

    /// Same weights with dropout disabled.
    ///
    /// Autodiff backends apply dropout on every forward pass, so gradient
    /// attributions use this copy.
    #[must_use]
    pub fn without_dropout(mut self) -> Self {
        self.dropout = DropoutConfig::new(0.0).init();
        self
    }

    /// Zero padding added in front of each CONV layer.
    #[must_use]
    pub fn causal_padding(&self) -> usize {
        self.causal_padding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn config(model_type: ModelType) -> StateClassifierConfig {
        StateClassifierConfig::new(3, 4)
            .with_model_type(model_type)
            .with_hidden_size(8)
            .with_num_layers(2)
            .with_dropout(0.0)
    }

    #[test]
    fn test_model_type_names() {
        assert_eq!("gru".parse::<ModelType>().unwrap(), ModelType::Gru);
        assert_eq!("CONV".parse::<ModelType>().unwrap(), ModelType::Conv);
        assert!("tcn".parse::<ModelType>().is_err());
        assert_eq!(ModelType::Conv.dir_name(3), "conv");
        assert_eq!(ModelType::Lstm.to_string(), "LSTM");
    }

    #[test]
    fn test_output_shapes() {
        let device = Default::default();
        for model_type in [ModelType::Gru, ModelType::Lstm, ModelType::Conv] {
            let model = config(model_type).init::<TestBackend>(&device);
            let x = Tensor::<TestBackend, 3>::random([2, 3, 7], Distribution::Normal(0.0, 1.0), &device);
            assert_eq!(model.forward_steps(x.clone()).dims(), [2, 7, 4]);
            assert_eq!(model.forward(x.clone()).dims(), [2, 4]);
            assert_eq!(model.forward_for_labels(x.clone(), 1).dims(), [2, 1, 4]);
            assert_eq!(model.forward_for_labels(x, 7).dims(), [2, 7, 4]);
        }
    }

    #[test]
    fn test_prefix_matches_full_sequence() {
        let device = Default::default();
        for model_type in [ModelType::Gru, ModelType::Lstm, ModelType::Conv] {
            let model = config(model_type).init::<TestBackend>(&device);
            let x = Tensor::<TestBackend, 3>::random([2, 3, 9], Distribution::Normal(0.0, 1.0), &device);

            let full = model.forward_steps(x.clone());
            let at_4 = full.slice([0..2, 4..5, 0..4]).reshape([2, 4]);
            let prefix = model.forward(x.slice([0..2, 0..3, 0..5]));

            let diff: f32 = (at_4 - prefix).abs().max().into_scalar().elem();
            assert!(diff < 1e-4, "{model_type} is not causal: {diff}");
        }
    }

    #[test]
    fn test_probs_sum_to_one() {
        let device = Default::default();
        let model = config(ModelType::Gru).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 3>::zeros([3, 3, 5], &device);
        let sums: Vec<f32> = model.forward_probs(x).sum_dim(1).into_data().to_vec().unwrap();
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-5));
    }
}
