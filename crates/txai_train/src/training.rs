//! Training loop implementation.
//!
//! [`ClassifierTrainer`] fits a sequence classifier with cross-entropy on
//! every labelled step; [`GeneratorTrainer`] fits a feature generator by
//! minimizing a loss evaluated at random split points of each batch. Both
//! take closures for the model-specific parts, keep the best weights seen on
//! the validation split and support early stopping.

use std::time::Instant;

use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;
use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};
use crate::metrics::ClassificationSummary;
use crate::scheduler::{LrSchedule, Scheduler};
use txai_core::{tensor_to_array2, Seed, Split};
use txai_data::{TSDataLoader, TSDataLoaders};

fn adam(weight_decay: f32) -> AdamConfig {
    let decay = (weight_decay > 0.0).then(|| WeightDecayConfig::new(weight_decay));
    AdamConfig::new().with_weight_decay(decay)
}

fn check_finite(epoch: usize, loss: f32) -> Result<f32> {
    if loss.is_finite() {
        Ok(loss)
    } else {
        Err(TrainError::Diverged { epoch, loss })
    }
}

/// Configuration for classifier training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierTrainerConfig {
    /// Number of epochs.
    pub n_epochs: usize,
    /// Learning rate (peak rate for one-cycle).
    pub lr: f64,
    /// Adam weight decay (0 = disabled).
    pub weight_decay: f32,
    /// Learning rate schedule.
    pub schedule: LrSchedule,
    /// Early stopping patience in epochs (0 = disabled).
    pub early_stopping_patience: usize,
    /// Minimum improvement that resets the patience counter.
    pub early_stopping_min_delta: f32,
}

impl Default for ClassifierTrainerConfig {
    fn default() -> Self {
        Self {
            n_epochs: 50,
            lr: 1e-3,
            weight_decay: 0.0,
            schedule: LrSchedule::Constant,
            early_stopping_patience: 0,
            early_stopping_min_delta: 1e-4,
        }
    }
}

/// Training output with per-epoch history and the selected model.
#[derive(Debug)]
pub struct TrainingOutput<M> {
    /// Weights of the best validation epoch.
    pub model: M,
    /// Training loss per epoch.
    pub train_losses: Vec<f32>,
    /// Validation loss per epoch.
    pub valid_losses: Vec<f32>,
    /// Validation metrics per epoch.
    pub valid_metrics: Vec<ClassificationSummary>,
    /// Selected epoch.
    pub best_epoch: usize,
    /// Validation loss of the selected epoch.
    pub best_valid_loss: f32,
    /// Validation AUROC of the selected epoch.
    pub best_valid_auroc: Option<f64>,
    /// Total training time in seconds.
    pub training_time_secs: f64,
}

/// Trainer for sequence classifiers.
pub struct ClassifierTrainer<B: AutodiffBackend> {
    config: ClassifierTrainerConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> ClassifierTrainer<B> {
    /// Create a new trainer.
    pub fn new(config: ClassifierTrainerConfig, device: B::Device) -> Self {
        Self { config, device }
    }

    /// Train a classifier using forward closures.
    ///
    /// `forward_fn(model, x, width)` maps `x (B, V, L)` to logits `(B, W, C)`
    /// aligned with `(B, W)` labels. `valid_forward_fn` does the same on the
    /// inner (non-autodiff) model. The epoch with the highest validation
    /// AUROC is kept; when AUROC is undefined the lowest validation loss wins.
    ///
    /// # Errors
    ///
    /// Returns an error for unlabelled batches, a non-positive learning rate
    /// or a diverging loss.
    pub fn fit_with_forward<M, F, G>(
        &self,
        model: M,
        dls: &TSDataLoaders,
        forward_fn: F,
        valid_forward_fn: G,
    ) -> Result<TrainingOutput<M>>
    where
        M: AutodiffModule<B> + Clone,
        F: Fn(&M, Tensor<B, 3>, usize) -> Tensor<B, 3>,
        G: Fn(&M::InnerModule, Tensor<B::InnerBackend, 3>, usize) -> Tensor<B::InnerBackend, 3>,
    {
        if self.config.lr <= 0.0 || !self.config.lr.is_finite() {
            return Err(TrainError::InvalidLearningRate(self.config.lr.to_string()));
        }
        let start_time = Instant::now();

        let mut optim = adam(self.config.weight_decay).init::<B, M>();
        let total_steps = self.config.n_epochs * dls.train().n_batches();
        let scheduler = self.config.schedule.build(self.config.lr, total_steps);

        let mut best_model = model.clone();
        let mut best_epoch = 0;
        let mut best_valid_loss = f32::INFINITY;
        let mut best_valid_auroc: Option<f64> = None;

        let mut train_losses = Vec::with_capacity(self.config.n_epochs);
        let mut valid_losses = Vec::with_capacity(self.config.n_epochs);
        let mut valid_metrics = Vec::with_capacity(self.config.n_epochs);

        let mut current_model = model;
        let mut global_step = 0;
        let mut epochs_without_improvement = 0;
        let min_delta = f64::from(self.config.early_stopping_min_delta);

        for epoch in 0..self.config.n_epochs {
            let train_loss = self.train_epoch(
                &mut current_model,
                &mut optim,
                dls.train(),
                scheduler.as_ref(),
                epoch,
                &mut global_step,
                &forward_fn,
            )?;
            train_losses.push(train_loss);

            let inner_model = current_model.clone().valid();
            let inner_device: <B::InnerBackend as Backend>::Device = self.device.clone().into();
            let (valid_loss, summary) = evaluate_classifier::<B::InnerBackend, _, _>(
                &inner_model,
                dls.valid(),
                &inner_device,
                &valid_forward_fn,
            )?;
            valid_losses.push(valid_loss);
            valid_metrics.push(summary);

            let improved = match (summary.auroc, best_valid_auroc) {
                (Some(auc), Some(best)) => auc > best + min_delta,
                (Some(_), None) => true,
                (None, _) => f64::from(valid_loss) < f64::from(best_valid_loss) - min_delta,
            };
            if improved {
                best_model = current_model.clone();
                best_epoch = epoch;
                best_valid_loss = valid_loss;
                best_valid_auroc = summary.auroc;
                epochs_without_improvement = 0;
            } else {
                epochs_without_improvement += 1;
            }

            tracing::info!(
                epoch = epoch + 1,
                n_epochs = self.config.n_epochs,
                train_loss,
                valid_loss,
                valid_auroc = summary.auroc.unwrap_or(f64::NAN),
                valid_acc = summary.accuracy,
                improved,
                "classifier epoch"
            );

            if self.config.early_stopping_patience > 0
                && epochs_without_improvement >= self.config.early_stopping_patience
            {
                tracing::info!(
                    patience = self.config.early_stopping_patience,
                    "early stopping"
                );
                break;
            }
        }

        let training_time_secs = start_time.elapsed().as_secs_f64();
        tracing::info!(
            best_epoch = best_epoch + 1,
            best_valid_loss,
            best_valid_auroc = best_valid_auroc.unwrap_or(f64::NAN),
            seconds = training_time_secs,
            "classifier training complete"
        );

        Ok(TrainingOutput {
            model: best_model,
            train_losses,
            valid_losses,
            valid_metrics,
            best_epoch,
            best_valid_loss,
            best_valid_auroc,
            training_time_secs,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn train_epoch<M, O, F>(
        &self,
        model: &mut M,
        optim: &mut O,
        loader: &TSDataLoader,
        scheduler: &dyn Scheduler,
        epoch: usize,
        global_step: &mut usize,
        forward_fn: &F,
    ) -> Result<f32>
    where
        M: AutodiffModule<B> + Clone,
        O: Optimizer<M, B>,
        F: Fn(&M, Tensor<B, 3>, usize) -> Tensor<B, 3>,
    {
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);
        let mut total_loss = 0.0f32;
        let mut n_batches = 0;

        for batch in loader.iter_epoch::<B>(&self.device, epoch) {
            let batch = batch?;
            let lr = scheduler.get_lr(*global_step);

            let y = batch.y.ok_or(TrainError::MissingTargets(Split::Train))?;
            let [batch_size, width] = y.dims();
            let logits = forward_fn(model, batch.x.into_inner(), width);
            let classes = logits.dims()[2];

            let loss = loss_fn.forward(
                logits.reshape([batch_size * width, classes]),
                y.reshape([batch_size * width]).int(),
            );
            total_loss += check_finite(epoch, loss.clone().into_scalar().elem::<f32>())?;

            let grads = GradientsParams::from_grads(loss.backward(), model);
            *model = optim.step(lr, model.clone(), grads);

            n_batches += 1;
            *global_step += 1;
            tracing::trace!(step = *global_step, lr, "optimizer step");
        }

        Ok(total_loss / n_batches.max(1) as f32)
    }
}

/// Loss and last-step metrics of a classifier over one loader.
///
/// The loss covers every labelled step; the metrics use the prediction at
/// the last step against the last label.
///
/// # Errors
///
/// Returns an error for unlabelled batches or inconsistent shapes.
pub fn evaluate_classifier<B, M, G>(
    model: &M,
    loader: &TSDataLoader,
    device: &B::Device,
    forward_fn: &G,
) -> Result<(f32, ClassificationSummary)>
where
    B: Backend,
    G: Fn(&M, Tensor<B, 3>, usize) -> Tensor<B, 3>,
{
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut total_loss = 0.0f32;
    let mut n_seen = 0usize;
    let mut probs: Vec<f32> = Vec::new();
    let mut labels: Vec<usize> = Vec::new();
    let mut n_classes = 0;

    for batch in loader.iter::<B>(device) {
        let batch = batch?;
        let y = batch.y.ok_or(TrainError::MissingTargets(loader.split()))?;
        let [batch_size, width] = y.dims();
        let logits = forward_fn(model, batch.x.into_inner(), width);
        n_classes = logits.dims()[2];

        let loss = loss_fn.forward(
            logits.clone().reshape([batch_size * width, n_classes]),
            y.clone().reshape([batch_size * width]).int(),
        );
        total_loss += loss.into_scalar().elem::<f32>() * batch_size as f32;
        n_seen += batch_size;

        let last = logits
            .slice([0..batch_size, width - 1..width, 0..n_classes])
            .reshape([batch_size, n_classes]);
        let p = tensor_to_array2(softmax(last, 1))?;
        probs.extend(p.iter().copied());

        let last_labels = tensor_to_array2(y.slice([0..batch_size, width - 1..width]))?;
        labels.extend(last_labels.iter().map(|&v| v as usize));
    }

    let probs = Array2::from_shape_vec((labels.len(), n_classes), probs)
        .map_err(|e| TrainError::MetricError(e.to_string()))?;
    let summary = ClassificationSummary::compute(probs.view(), &labels)?;
    Ok((total_loss / n_seen.max(1) as f32, summary))
}

/// Configuration for generator training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorTrainerConfig {
    /// Number of epochs.
    pub n_epochs: usize,
    /// Learning rate.
    pub lr: f64,
    /// Adam weight decay (0 = disabled).
    pub weight_decay: f32,
    /// Early stopping patience in epochs (0 = disabled).
    pub early_stopping_patience: usize,
    /// Minimum improvement that resets the patience counter.
    pub early_stopping_min_delta: f32,
    /// Seed of the split-point draws.
    pub seed: Seed,
}

impl Default for GeneratorTrainerConfig {
    fn default() -> Self {
        Self {
            n_epochs: 300,
            lr: 1e-3,
            weight_decay: 0.0,
            early_stopping_patience: 20,
            early_stopping_min_delta: 1e-4,
            seed: Seed::new(0),
        }
    }
}

/// Generator training output.
#[derive(Debug)]
pub struct GeneratorTrainingOutput<M> {
    /// Weights of the lowest validation loss.
    pub model: M,
    /// Training loss per epoch.
    pub train_losses: Vec<f32>,
    /// Validation loss per epoch.
    pub valid_losses: Vec<f32>,
    /// Selected epoch.
    pub best_epoch: usize,
    /// Validation loss of the selected epoch.
    pub best_valid_loss: f32,
    /// Total training time in seconds.
    pub training_time_secs: f64,
}

/// Trainer for feature generators.
pub struct GeneratorTrainer<B: AutodiffBackend> {
    config: GeneratorTrainerConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> GeneratorTrainer<B> {
    /// Create a new trainer.
    pub fn new(config: GeneratorTrainerConfig, device: B::Device) -> Self {
        Self { config, device }
    }

    /// Train with a loss closure evaluated at one split point per batch.
    ///
    /// `loss_fn(model, x, t)` returns the loss of predicting `x[.., .., t..]`
    /// from `x[.., .., ..t]`. Training split points are redrawn every epoch;
    /// validation split points are fixed so epochs are comparable.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-positive learning rate or a diverging loss.
    pub fn fit_with_loss<M, F, G>(
        &self,
        model: M,
        dls: &TSDataLoaders,
        loss_fn: F,
        valid_loss_fn: G,
    ) -> Result<GeneratorTrainingOutput<M>>
    where
        M: AutodiffModule<B> + Clone,
        F: Fn(&M, Tensor<B, 3>, usize) -> Tensor<B, 1>,
        G: Fn(&M::InnerModule, Tensor<B::InnerBackend, 3>, usize) -> Tensor<B::InnerBackend, 1>,
    {
        if self.config.lr <= 0.0 || !self.config.lr.is_finite() {
            return Err(TrainError::InvalidLearningRate(self.config.lr.to_string()));
        }
        let start_time = Instant::now();
        let mut optim = adam(self.config.weight_decay).init::<B, M>();
        let seq_len = dls.seq_len().max(1);
        let inner_device: <B::InnerBackend as Backend>::Device = self.device.clone().into();

        let mut best_model = model.clone();
        let mut best_epoch = 0;
        let mut best_valid_loss = f32::INFINITY;
        let mut train_losses = Vec::with_capacity(self.config.n_epochs);
        let mut valid_losses = Vec::with_capacity(self.config.n_epochs);
        let mut current_model = model;
        let mut epochs_without_improvement = 0;

        for epoch in 0..self.config.n_epochs {
            let mut rng = self.config.seed.derive(&format!("split{epoch}")).to_rng();
            let mut total = 0.0f32;
            let mut n_batches = 0;
            for batch in dls.train().iter_epoch::<B>(&self.device, epoch) {
                let x = batch?.x.into_inner();
                let t = rng.gen_range(0..seq_len);
                let loss = loss_fn(&current_model, x, t);
                total += check_finite(epoch, loss.clone().into_scalar().elem::<f32>())?;
                let grads = GradientsParams::from_grads(loss.backward(), &current_model);
                current_model = optim.step(self.config.lr, current_model, grads);
                n_batches += 1;
            }
            let train_loss = total / n_batches.max(1) as f32;
            train_losses.push(train_loss);

            let inner_model = current_model.clone().valid();
            let mut rng = self.config.seed.derive("valid").to_rng();
            let mut total = 0.0f32;
            let mut n_batches = 0;
            for batch in dls.valid().iter::<B::InnerBackend>(&inner_device) {
                let x = batch?.x.into_inner();
                let t = rng.gen_range(0..seq_len);
                total += valid_loss_fn(&inner_model, x, t).into_scalar().elem::<f32>();
                n_batches += 1;
            }
            let valid_loss = total / n_batches.max(1) as f32;
            valid_losses.push(valid_loss);

            let improved = valid_loss < best_valid_loss - self.config.early_stopping_min_delta;
            if improved {
                best_model = current_model.clone();
                best_epoch = epoch;
                best_valid_loss = valid_loss;
                epochs_without_improvement = 0;
            } else {
                epochs_without_improvement += 1;
            }
            tracing::debug!(
                epoch = epoch + 1,
                n_epochs = self.config.n_epochs,
                train_loss,
                valid_loss,
                improved,
                "generator epoch"
            );

            if self.config.early_stopping_patience > 0
                && epochs_without_improvement >= self.config.early_stopping_patience
            {
                tracing::info!(epoch = epoch + 1, "generator early stopping");
                break;
            }
        }

        let training_time_secs = start_time.elapsed().as_secs_f64();
        tracing::info!(
            best_epoch = best_epoch + 1,
            best_valid_loss,
            seconds = training_time_secs,
            "generator training complete"
        );

        Ok(GeneratorTrainingOutput {
            model: best_model,
            train_losses,
            valid_losses,
            best_epoch,
            best_valid_loss,
            training_time_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trainer_config_default() {
        let config = ClassifierTrainerConfig::default();
        assert_eq!(config.lr, 1e-3);
        assert_eq!(config.schedule, LrSchedule::Constant);
        assert_eq!(GeneratorTrainerConfig::default().early_stopping_patience, 20);
    }

    #[test]
    fn test_divergence_is_reported() {
        assert!(check_finite(0, 1.0).is_ok());
        assert!(matches!(
            check_finite(3, f32::NAN),
            Err(TrainError::Diverged { epoch: 3, .. })
        ));
    }
}
