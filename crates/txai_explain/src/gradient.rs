//! Gradient attributions: Integrated Gradients and Input × Gradient.
//!
//! Both score the prediction at every step `t` separately: the model sees
//! the prefix `x[.., .., ..=t]`, the target is its predicted class, and the
//! attribution of the last observation of the prefix becomes column `t` of
//! the importance map.

use std::str::FromStr;

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;
use ndarray::{s, Array3};
use serde::{Deserialize, Serialize};

use crate::error::{ExplainError, Result};
use crate::importance::ImportanceMap;
use txai_core::{array3_to_tensor, tensor_to_array2, tensor_to_array3};
use txai_models::StateClassifier;

/// Gradient attribution method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientMethod {
    /// Integrated Gradients from a zero baseline.
    IntegratedGradients,
    /// Input × Gradient.
    InputXGradient,
}

impl GradientMethod {
    /// Short name, `ig` or `ixg`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            GradientMethod::IntegratedGradients => "ig",
            GradientMethod::InputXGradient => "ixg",
        }
    }
}

impl FromStr for GradientMethod {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ig" | "integrated_gradients" => Ok(GradientMethod::IntegratedGradients),
            "ixg" | "inputxgradient" | "input_x_gradient" => Ok(GradientMethod::InputXGradient),
            other => Err(ExplainError::UnknownExplainer(other.to_string())),
        }
    }
}

/// Configuration for Integrated Gradients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratedGradientsConfig {
    /// Number of steps for the trapezoid approximation of the path integral.
    pub n_steps: usize,
}

impl Default for IntegratedGradientsConfig {
    fn default() -> Self {
        Self { n_steps: 50 }
    }
}

/// Integrated Gradients along the straight path from `baseline` to `input`.
///
/// `gradients_fn` returns the gradient of the target output at an
/// interpolated input. The result keeps its sign.
///
/// Reference: Sundararajan et al., "Axiomatic Attribution for Deep Networks", ICML 2017.
pub fn integrated_gradients<B: Backend, F>(
    input: &Tensor<B, 3>,
    baseline: &Tensor<B, 3>,
    gradients_fn: F,
    config: &IntegratedGradientsConfig,
) -> Tensor<B, 3>
where
    F: Fn(&Tensor<B, 3>) -> Tensor<B, 3>,
{
    let n_steps = config.n_steps.max(1);
    let diff = input.clone() - baseline.clone();
    let mut integral = Tensor::<B, 3>::zeros(input.dims(), &input.device());

    for step in 0..=n_steps {
        let alpha = step as f32 / n_steps as f32;
        let grads = gradients_fn(&(baseline.clone() + diff.clone() * alpha));
        // trapezoid: endpoints weigh half
        let weight = if step == 0 || step == n_steps { 0.5 } else { 1.0 };
        integral = integral + grads * weight;
    }

    diff * integral / n_steps as f32
}

/// `|input · gradients|`.
pub fn input_gradient<B: Backend>(input: Tensor<B, 3>, gradients: Tensor<B, 3>) -> Tensor<B, 3> {
    (input * gradients).abs()
}

/// Gradient of the selected class probability with respect to `x`.
///
/// `target` is a one-hot `(N, C)` mask on the inner backend.
fn probability_gradient<B: AutodiffBackend>(
    model: &StateClassifier<B>,
    x: &Tensor<B::InnerBackend, 3>,
    target: &Tensor<B::InnerBackend, 2>,
) -> Tensor<B::InnerBackend, 3> {
    let x_ad = Tensor::<B, 3>::from_inner(x.clone()).require_grad();
    let selected = (model.forward_probs(x_ad.clone()) * Tensor::<B, 2>::from_inner(target.clone())).sum();
    let grads = selected.backward();
    x_ad.grad(&grads)
        .unwrap_or_else(|| Tensor::zeros(x.dims(), &x.device()))
}

/// Gradient explainer over an autodiff classifier.
#[derive(Debug, Clone)]
pub struct GradientExplainer<B: AutodiffBackend> {
    model: StateClassifier<B>,
    device: B::Device,
    method: GradientMethod,
    ig: IntegratedGradientsConfig,
    batch_size: usize,
}

impl<B: AutodiffBackend> GradientExplainer<B> {
    /// Wrap a trained model; dropout is switched off.
    pub fn new(model: StateClassifier<B>, device: B::Device, method: GradientMethod) -> Self {
        Self {
            model: model.without_dropout(),
            device,
            method,
            ig: IntegratedGradientsConfig::default(),
            batch_size: 256,
        }
    }

    /// Set the Integrated Gradients config.
    pub fn with_ig_config(mut self, config: IntegratedGradientsConfig) -> Self {
        self.ig = config;
        self
    }

    /// Set the number of series per backward pass.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// The method.
    pub fn method(&self) -> GradientMethod {
        self.method
    }

    /// Signed `(N, L, V)` importance of `x (N, V, L)`.
    ///
    /// # Errors
    ///
    /// Propagates tensor conversion failures.
    pub fn attribute(&self, x: &Array3<f32>) -> Result<ImportanceMap> {
        let (n, n_vars, seq_len) = x.dim();
        let mut out = Array3::<f32>::zeros((n, n_vars, seq_len));

        for start in (0..n).step_by(self.batch_size) {
            let end = (start + self.batch_size).min(n);
            for t in 0..seq_len {
                let prefix = x.slice(s![start..end, .., ..=t]).to_owned();
                let attr = self.attribute_prefix(&prefix)?;
                out.slice_mut(s![start..end, .., t])
                    .assign(&attr.slice(s![.., .., t]));
            }
            tracing::debug!(method = self.method.as_str(), done = end, total = n, "gradient batch");
        }
        Ok(ImportanceMap::from_input_layout(out, true))
    }

    fn attribute_prefix(&self, prefix: &Array3<f32>) -> Result<Array3<f32>> {
        let input = array3_to_tensor::<B::InnerBackend>(prefix, &self.device);
        let target = self.predicted_one_hot(&input)?;
        let grad_fn = |xi: &Tensor<B::InnerBackend, 3>| probability_gradient(&self.model, xi, &target);

        let attr = match self.method {
            GradientMethod::IntegratedGradients => {
                let baseline = input.zeros_like();
                integrated_gradients(&input, &baseline, grad_fn, &self.ig)
            }
            GradientMethod::InputXGradient => {
                let grads = grad_fn(&input);
                input_gradient(input, grads)
            }
        };
        Ok(tensor_to_array3(attr)?)
    }

    fn predicted_one_hot(
        &self,
        input: &Tensor<B::InnerBackend, 3>,
    ) -> Result<Tensor<B::InnerBackend, 2>> {
        let probs = tensor_to_array2(self.model.valid().forward_probs(input.clone()))?;
        let (rows, classes) = probs.dim();
        let mut mask = vec![0.0f32; rows * classes];
        for (i, row) in probs.outer_iter().enumerate() {
            let best = row
                .iter()
                .enumerate()
                .fold(0, |best, (c, p)| if *p > row[best] { c } else { best });
            mask[i * classes + best] = 1.0;
        }
        Ok(Tensor::from_data(
            TensorData::new(mask, [rows, classes]),
            &self.device,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use txai_models::{ModelType, StateClassifierConfig};

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    #[test]
    fn test_input_gradient() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 3>::ones([2, 3, 10], &device);
        let gradients = Tensor::<TestBackend, 3>::ones([2, 3, 10], &device) * -2.0;
        let sum: f32 = input_gradient(input, gradients).sum().into_scalar().elem();
        assert!((sum - 2.0 * 60.0).abs() < 1e-5);
    }

    #[test]
    fn test_integrated_gradients_of_quadratic() {
        // f(x) = sum x^2 / 2 has gradient x; IG from zero recovers x^2 / 2
        let device = Default::default();
        let input = Tensor::<TestBackend, 3>::ones([1, 2, 5], &device) * 3.0;
        let baseline = input.zeros_like();
        let config = IntegratedGradientsConfig { n_steps: 10 };
        let attr = integrated_gradients(&input, &baseline, |x| x.clone(), &config);
        let values = tensor_to_array3(attr).unwrap();
        assert!(values.iter().all(|v| (v - 4.5).abs() < 1e-4));
    }

    #[test]
    fn test_completeness_on_classifier() {
        // attributions of the last step sum to p(x) - p(0) over all features and times
        let device = Default::default();
        let model = StateClassifierConfig::new(2, 2)
            .with_hidden_size(6)
            .with_model_type(ModelType::Gru)
            .init::<TestAutodiffBackend>(&device);
        let x = Array3::from_shape_fn((1, 2, 4), |(_, f, t)| (f as f32 - 0.5) * (t as f32 + 1.0) * 0.3);

        let explainer = GradientExplainer::new(model.clone(), device, GradientMethod::IntegratedGradients)
            .with_ig_config(IntegratedGradientsConfig { n_steps: 200 });
        let input = array3_to_tensor::<NdArray>(&x, &device);
        let target = explainer.predicted_one_hot(&input).unwrap();
        let attr = explainer.attribute_prefix(&x).unwrap();

        let inner = model.valid().without_dropout();
        let p = |t: Tensor<NdArray, 3>| -> f32 {
            (inner.forward_probs(t) * target.clone()).sum().into_scalar().elem()
        };
        let expected = p(input.clone()) - p(input.zeros_like());
        assert!((attr.sum() - expected).abs() < 1e-2);
    }

    #[test]
    fn test_attribute_shape_and_sign_flag() {
        let device = Default::default();
        let model = StateClassifierConfig::new(3, 2)
            .with_hidden_size(4)
            .with_model_type(ModelType::Conv)
            .init::<TestAutodiffBackend>(&device);
        let x = Array3::from_shape_fn((2, 3, 5), |(i, f, t)| (i + f * t) as f32 * 0.1);

        for method in [GradientMethod::IntegratedGradients, GradientMethod::InputXGradient] {
            let map = GradientExplainer::new(model.clone(), device, method)
                .with_ig_config(IntegratedGradientsConfig { n_steps: 4 })
                .with_batch_size(1)
                .attribute(&x)
                .unwrap();
            assert_eq!(map.dim(), (2, 5, 3));
            assert!(map.is_signed());
            assert!(map.values().iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_method_names() {
        assert_eq!("IG".parse::<GradientMethod>().unwrap(), GradientMethod::IntegratedGradients);
        assert_eq!(GradientMethod::InputXGradient.as_str(), "ixg");
        assert!("deeplift".parse::<GradientMethod>().is_err());
    }
}
