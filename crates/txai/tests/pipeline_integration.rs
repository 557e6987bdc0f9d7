//! Integration tests for the experiment pipeline.
//!
//! A small spike dataset is written to a temporary directory and taken
//! through training, generator training, explanation and evaluation.

use std::collections::HashSet;
use std::path::Path;

use txai::pipeline::{DropMode, ExplanationRunner, PipelineError, RunConfig, StepFlags};
use txai_core::Seed;
use txai_data::SpikeConfig;
use txai_eval::{MaskMethod, ResultsTable};
use txai_explain::{Aggregation, CounterfactualOrigin, ExplainError, ExplainerSpec};

fn write_spike(dir: &Path) {
    SpikeConfig {
        n_train: 40,
        n_test: 10,
        seq_len: 12,
        seed: Seed::new(5),
        ..SpikeConfig::default()
    }
    .generate()
    .expect("spike data")
    .write(dir)
    .expect("write spike data");
}

fn small_config(root: &Path) -> RunConfig {
    let mut config = RunConfig::default();
    config.data.path = root.join("data");
    config.data.batch_size = 8;
    config.data.test_batch_size = Some(10);
    config.model.hidden_size = 8;
    config.model.dropout = 0.0;
    config.model.epochs = Some(2);
    config.generator.epochs = 2;
    config.generator.hidden_size = 8;
    config.generator.early_stopping_patience = 0;
    config.explainers.names = vec!["winit".to_string(), "fo".to_string()];
    config.explainers.windows = vec![2];
    config.explainers.samples = 2;
    config.evaluation.drop = vec![DropMode::Local];
    config.evaluation.mask = vec![MaskMethod::Std];
    config.evaluation.top = 2;
    config.evaluation.aggregate = vec![Aggregation::Mean, Aggregation::Max];
    config.evaluation.drop_on_simulated = true;
    config.paths.out = root.join("out");
    config.paths.ckpt = root.join("ckpt");
    config.paths.log = None;
    config
}

#[test]
fn test_full_run_writes_one_row_per_masker() {
    let dir = tempfile::tempdir().unwrap();
    write_spike(&dir.path().join("data"));
    let config = small_config(dir.path());

    let mut runner = ExplanationRunner::new(config).expect("runner");
    let summary = runner.run().expect("run succeeds");

    assert_eq!(summary.explainers, vec!["winit_w2_pd".to_string(), "fo".to_string()]);
    // per explainer: 2 ground-truth rows and 1 local std masker per aggregation
    assert_eq!(summary.rows, 2 * (2 + 2));

    let rows = ResultsTable::new(&summary.results_path).read().unwrap();
    assert_eq!(rows.len(), summary.rows);
    let keys: HashSet<_> = rows
        .iter()
        .map(|r| (r.dataset.clone(), r.model_type.clone(), r.explainer.clone(), r.masker.clone()))
        .collect();
    assert_eq!(keys.len(), rows.len());
    assert!(rows.iter().all(|r| r.dataset == "spike" && r.model_type == "gru1layer"));
    assert!(rows.iter().any(|r| r.masker == "top2_std_max"));
    assert!(rows.iter().any(|r| r.masker == "groundtruth_mean"));

    let importance = runner.paths().importance_path("winit_w2_pd", 0);
    let values: ndarray::Array3<f32> = txai_data::read_npy(&importance).unwrap();
    assert_eq!(values.dim(), (10, 12, 3));
    assert!(runner.paths().windowed_path("winit_w2_pd", 0).exists());
}

#[test]
fn test_winit_is_reproducible_and_reloadable() {
    let dir = tempfile::tempdir().unwrap();
    write_spike(&dir.path().join("data"));
    let mut config = small_config(dir.path());
    config.explainers.names = vec!["winit".to_string()];

    let mut runner = ExplanationRunner::new(config.clone()).expect("runner");
    runner.train_classifier().expect("classifier trains");
    let specs = runner.config().explainer_specs().unwrap();
    let written = runner.train_generators(&specs).unwrap();
    assert_eq!(written.len(), 1);

    let first = runner.explain(&specs[0]).unwrap();
    let second = runner.explain(&specs[0]).unwrap();
    assert_eq!(first.importance.values(), second.importance.values());
    assert_eq!(first.origin, Some(CounterfactualOrigin::Generator));

    // A second process evaluates the saved arrays with the saved classifier.
    config.steps = StepFlags {
        train: false,
        traingen: false,
        skipexplain: true,
        eval: true,
    };
    let mut reloaded = ExplanationRunner::new(config).expect("runner");
    let summary = reloaded.run().expect("evaluation succeeds");
    assert_eq!(summary.rows, 4);

    let loaded = reloaded.load_explanation(&specs[0]).unwrap();
    assert_eq!(loaded.importance.values(), first.importance.values());
    assert!(loaded.windowed.is_some());
}

#[test]
fn test_missing_generator_needs_explicit_fallback() {
    let dir = tempfile::tempdir().unwrap();
    write_spike(&dir.path().join("data"));
    let mut config = small_config(dir.path());
    config.explainers.names = vec!["winit".to_string()];

    let mut runner = ExplanationRunner::new(config.clone()).expect("runner");
    runner.train_classifier().expect("classifier trains");
    let spec = runner.config().explainer_specs().unwrap().remove(0);
    assert!(matches!(
        runner.explain(&spec),
        Err(PipelineError::Explain(ExplainError::MissingGenerator(_)))
    ));

    config.explainers.allow_marginal_fallback = true;
    let mut runner = ExplanationRunner::new(config).expect("runner");
    runner.load_classifier().expect("checkpoint from the first runner");
    let explanation = runner.explain(&spec).unwrap();
    assert_eq!(explanation.origin, Some(CounterfactualOrigin::MarginalFallback));
    assert_eq!(explanation.importance.dim(), (10, 12, 3));
}

#[test]
fn test_gradient_explainer_through_runner() {
    let dir = tempfile::tempdir().unwrap();
    write_spike(&dir.path().join("data"));
    let mut config = small_config(dir.path());
    config.explainers.names = vec!["ig".to_string()];
    config.explainers.ig_steps = 4;

    let mut runner = ExplanationRunner::new(config).expect("runner");
    runner.train_classifier().expect("classifier trains");
    let spec = runner.config().explainer_specs().unwrap().remove(0);
    assert!(matches!(spec, ExplainerSpec::Gradient { n_steps: 4, .. }));

    let explanation = runner.explain(&spec).unwrap();
    assert!(explanation.importance.is_signed());
    let baseline = runner.performance_baseline().unwrap();
    let rows = runner.evaluate(&explanation, baseline.as_ref()).unwrap();
    assert_eq!(rows.len(), 4);
}

#[test]
fn test_explaining_without_classifier_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_spike(&dir.path().join("data"));
    let config = small_config(dir.path());
    let mut runner = ExplanationRunner::new(config).expect("runner");
    assert!(matches!(runner.predictor(), Err(PipelineError::NoClassifier)));
    assert!(runner.load_classifier().is_err());
}
