//! Integration tests for the training loops.
//!
//! These tests fit small models on seeded synthetic data.

use burn::prelude::*;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use ndarray::{Array2, Array3};

use txai_core::Seed;
use txai_data::{TSDataLoaders, TSDataset, TSDatasets};
use txai_models::{FeatureGeneratorConfig, ModelType, StateClassifierConfig};
use txai_train::{
    ClassifierTrainer, ClassifierTrainerConfig, GeneratorTrainer, GeneratorTrainerConfig,
};

type TrainBackend = Autodiff<NdArray>;

/// Series whose per-step label is 1 once feature 0 has been positive.
fn create_synthetic_data(n_samples: usize, seq_len: usize, seed: u64) -> TSDataset {
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut x = Array3::<f32>::zeros((n_samples, 2, seq_len));
    let mut y = Array2::<f32>::zeros((n_samples, seq_len));

    for i in 0..n_samples {
        for v in 0..2 {
            for t in 0..seq_len {
                x[[i, v, t]] = rng.gen::<f32>() * 0.1 - 0.05;
            }
        }
        if i % 2 == 0 {
            let t_on = rng.gen_range(1..seq_len);
            x[[i, 0, t_on]] = 2.0;
            for t in t_on..seq_len {
                y[[i, t]] = 1.0;
            }
        }
    }
    TSDataset::from_arrays(x, Some(y)).expect("valid synthetic data")
}

fn loaders() -> TSDataLoaders {
    let data = TSDatasets::new(
        create_synthetic_data(48, 10, 1),
        create_synthetic_data(16, 10, 2),
        create_synthetic_data(16, 10, 3),
        0,
    )
    .expect("consistent parts");
    TSDataLoaders::from_datasets(&data, 8, 16, Seed::new(42)).expect("loaders")
}

#[test]
fn test_classifier_training_per_step_labels() {
    let dls = loaders();
    let device = <TrainBackend as Backend>::Device::default();

    for model_type in [ModelType::Gru, ModelType::Conv] {
        let model = StateClassifierConfig::new(2, 2)
            .with_model_type(model_type)
            .with_hidden_size(8)
            .with_dropout(0.0)
            .init::<TrainBackend>(&device);

        let config = ClassifierTrainerConfig {
            n_epochs: 3,
            lr: 1e-2,
            ..Default::default()
        };
        let trainer = ClassifierTrainer::<TrainBackend>::new(config, device.clone());
        let output = trainer
            .fit_with_forward(
                model,
                &dls,
                |m, x, w| m.forward_for_labels(x, w),
                |m, x, w| m.forward_for_labels(x, w),
            )
            .expect("training succeeds");

        assert_eq!(output.train_losses.len(), 3);
        assert_eq!(output.valid_metrics.len(), 3);
        assert!(output.train_losses.iter().all(|l| l.is_finite()));
        assert!(output.best_epoch < 3);
        assert!(output.best_valid_auroc.is_some());
    }
}

#[test]
fn test_classifier_early_stopping() {
    let dls = loaders();
    let device = <TrainBackend as Backend>::Device::default();
    let model = StateClassifierConfig::new(2, 2)
        .with_hidden_size(4)
        .init::<TrainBackend>(&device);

    // A tiny rate cannot beat the first epoch by the required margin.
    let config = ClassifierTrainerConfig {
        n_epochs: 20,
        lr: 1e-9,
        early_stopping_patience: 2,
        early_stopping_min_delta: 0.5,
        ..Default::default()
    };
    let output = ClassifierTrainer::<TrainBackend>::new(config, device)
        .fit_with_forward(
            model,
            &dls,
            |m, x, w| m.forward_for_labels(x, w),
            |m, x, w| m.forward_for_labels(x, w),
        )
        .expect("training succeeds");
    assert_eq!(output.train_losses.len(), 3);
    assert_eq!(output.best_epoch, 0);
}

#[test]
fn test_generator_training_reduces_loss() {
    let dls = loaders();
    let device = <TrainBackend as Backend>::Device::default();
    let generator = FeatureGeneratorConfig::new(2, 3)
        .with_hidden_size(8)
        .init::<TrainBackend>(&device);

    let config = GeneratorTrainerConfig {
        n_epochs: 15,
        lr: 1e-2,
        early_stopping_patience: 0,
        seed: Seed::new(7),
        ..Default::default()
    };
    let output = GeneratorTrainer::<TrainBackend>::new(config, device)
        .fit_with_loss(
            generator,
            &dls,
            |g, x, t| g.loss_at(x, t),
            |g, x, t| g.loss_at(x, t),
        )
        .expect("training succeeds");

    assert_eq!(output.valid_losses.len(), 15);
    assert!(output.best_valid_loss <= output.valid_losses[0]);
    assert!(output.best_valid_loss.is_finite());
}
