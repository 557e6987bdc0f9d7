//! The seam between explainers and models.
//!
//! Explainers and evaluators only need class probabilities at the last step
//! of whatever (possibly truncated) series they pass in. [`Predictor`] hides
//! the backend; closures implement it for tests.

use burn::prelude::*;
use ndarray::{concatenate, s, Array2, Array3, Axis};

use crate::error::{ExplainError, Result};
use txai_core::{array3_to_tensor, tensor_to_array2};
use txai_models::StateClassifier;

/// Class probabilities at the last step of a batch of series.
pub trait Predictor {
    /// `x (N, V, T)` to probabilities `(N, C)` at step `T - 1`.
    fn predict_proba(&self, x: &Array3<f32>) -> Result<Array2<f32>>;
}

impl<F> Predictor for F
where
    F: Fn(&Array3<f32>) -> Result<Array2<f32>>,
{
    fn predict_proba(&self, x: &Array3<f32>) -> Result<Array2<f32>> {
        self(x)
    }
}

/// [`Predictor`] over a trained [`StateClassifier`], evaluated in batches.
#[derive(Debug, Clone)]
pub struct ClassifierPredictor<B: Backend> {
    model: StateClassifier<B>,
    device: B::Device,
    batch_size: usize,
}

impl<B: Backend> ClassifierPredictor<B> {
    /// Wrap a model; inputs are split into chunks of `batch_size` series.
    pub fn new(model: StateClassifier<B>, device: B::Device, batch_size: usize) -> Self {
        Self {
            model,
            device,
            batch_size: batch_size.max(1),
        }
    }

    /// The wrapped model.
    pub fn model(&self) -> &StateClassifier<B> {
        &self.model
    }
}

impl<B: Backend> Predictor for ClassifierPredictor<B> {
    fn predict_proba(&self, x: &Array3<f32>) -> Result<Array2<f32>> {
        let (n, _, steps) = x.dim();
        if steps == 0 {
            return Err(ExplainError::InvalidShape(
                "cannot predict from an empty series".to_string(),
            ));
        }
        let mut parts = Vec::with_capacity(n.div_ceil(self.batch_size));
        for start in (0..n).step_by(self.batch_size) {
            let end = (start + self.batch_size).min(n);
            let chunk = x.slice(s![start..end, .., ..]).to_owned();
            let probs = self
                .model
                .forward_probs(array3_to_tensor::<B>(&chunk, &self.device));
            parts.push(tensor_to_array2(probs)?);
        }
        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        concatenate(Axis(0), &views).map_err(|e| ExplainError::Prediction(e.to_string()))
    }
}
