//! The experiment runner.
//!
//! [`ExplanationRunner`] owns one fold of one dataset and walks it through
//! classifier training, generator training, explanation and evaluation.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use burn::module::AutodiffModule;

use super::config::RunConfig;
use super::error::{PipelineError, Result};
use super::paths::RunPaths;
use txai_core::backend::{InferBackend, NdArrayDevice, TrainBackend};
use txai_core::{DeterministicMode, Seed, TSShape};
use txai_data::{LoadOptions, TSDataLoaders, TSDatasets};
use txai_eval::{
    evaluate_ground_truth, Masker, PerformanceDrop, ResultRow, ResultsTable, RowKey,
};
use txai_explain::{
    ClassifierPredictor, CounterfactualSampler, ExplainError, Explainer, ExplainerSpec,
    Explanation, GeneratorSampler, GradientExplainer, ImportanceMap, IntegratedGradientsConfig,
    MarginalMode, MarginalSampler, Occlusion, WinIT, WinITConfig, WindowedScores,
};
use txai_models::{
    expect_kind, CheckpointMetadata, FeatureGenerator, FeatureGeneratorConfig, ModelCheckpoint,
    StateClassifier, StateClassifierConfig, CLASSIFIER_KIND, GENERATOR_KIND,
};
use txai_train::{
    ClassificationSummary, ClassifierTrainer, ClassifierTrainerConfig, GeneratorTrainer,
    GeneratorTrainerConfig,
};

/// Outcome of classifier training.
#[derive(Debug, Clone)]
pub struct ClassifierReport {
    /// Epoch whose weights were kept.
    pub best_epoch: usize,
    /// Validation loss of that epoch.
    pub best_valid_loss: f32,
    /// Validation AUROC of that epoch.
    pub best_valid_auroc: Option<f64>,
    /// Last-step performance on the test split.
    pub test: ClassificationSummary,
    /// Wall time.
    pub training_time_secs: f64,
}

/// Outcome of [`ExplanationRunner::run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Explainers that produced or loaded importance.
    pub explainers: Vec<String>,
    /// Rows appended to the results table.
    pub rows: usize,
    /// Results table.
    pub results_path: PathBuf,
    /// Wall time.
    pub elapsed_secs: f64,
}

/// Runs the experiment steps on one fold.
#[derive(Debug)]
pub struct ExplanationRunner {
    config: RunConfig,
    paths: RunPaths,
    mode: DeterministicMode,
    data: TSDatasets,
    device: NdArrayDevice,
    classifier: Option<StateClassifier<TrainBackend>>,
}

impl ExplanationRunner {
    /// Load the configured dataset fold.
    ///
    /// # Errors
    ///
    /// Invalid config values, a bad `TXAI_DETERMINISTIC` value, or data
    /// loading failures.
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        let options = LoadOptions {
            cv: config.data.cv,
            train_ratio: config.data.train_ratio,
            seed: Seed::new(config.data.seed),
        };
        let data = config.data.name.load(&config.data.path, &options)?;
        Self::with_datasets(config, data)
    }

    /// Runner over already loaded data.
    ///
    /// # Errors
    ///
    /// Invalid config values or a bad `TXAI_DETERMINISTIC` value.
    pub fn with_datasets(config: RunConfig, data: TSDatasets) -> Result<Self> {
        config.validate()?;
        let mode = DeterministicMode::resolve(config.deterministic)?;
        mode.apply::<TrainBackend>(Seed::new(config.data.seed));
        let paths = RunPaths::new(&config);
        tracing::info!(
            dataset = config.data.name.name(),
            model = %config.model_dir(),
            cv = data.cv(),
            deterministic = mode.is_enabled(),
            "runner ready"
        );
        Ok(Self {
            config,
            paths,
            mode,
            data,
            device: NdArrayDevice::default(),
            classifier: None,
        })
    }

    /// The configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The file layout.
    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    /// The loaded fold.
    pub fn data(&self) -> &TSDatasets {
        &self.data
    }

    fn cv(&self) -> usize {
        self.data.cv()
    }

    fn loaders(&self) -> Result<TSDataLoaders> {
        Ok(TSDataLoaders::from_datasets(
            &self.data,
            self.config.data.batch_size,
            self.config.test_batch_size(),
            self.mode.seed(Seed::new(self.config.data.seed)),
        )?)
    }

    fn classifier_config(&self) -> StateClassifierConfig {
        let m = &self.config.model;
        StateClassifierConfig::new(self.data.n_vars(), self.data.n_classes())
            .with_model_type(m.model_type)
            .with_hidden_size(m.hidden_size)
            .with_num_layers(m.num_layers)
            .with_dropout(m.dropout)
    }

    /// Train the classifier and save its checkpoint.
    ///
    /// # Errors
    ///
    /// Training, checkpoint or metric failures.
    pub fn train_classifier(&mut self) -> Result<ClassifierReport> {
        let dls = self.loaders()?;
        let model_config = self.classifier_config();
        let model = model_config.init::<TrainBackend>(&self.device);

        let trainer_config = ClassifierTrainerConfig {
            n_epochs: self.config.classifier_epochs(),
            lr: self.config.learning_rate(),
            weight_decay: self.config.model.weight_decay,
            early_stopping_patience: self.config.model.early_stopping_patience,
            ..Default::default()
        };
        tracing::info!(
            model = %model_config.model_type,
            epochs = trainer_config.n_epochs,
            lr = trainer_config.lr,
            "training classifier"
        );
        let output = ClassifierTrainer::<TrainBackend>::new(trainer_config, self.device.clone())
            .fit_with_forward(
                model,
                &dls,
                |m, x, w| m.forward_for_labels(x, w),
                |m, x, w| m.forward_for_labels(x, w),
            )?;

        let stem = self.paths.classifier_stem(self.cv());
        let metadata = CheckpointMetadata::new(CLASSIFIER_KIND)
            .with_config(&model_config)?
            .with_best(
                output.best_epoch,
                output.best_valid_loss,
                output.best_valid_auroc.map(|a| a as f32),
            )
            .with_extra("dataset", self.config.data.name.name());
        output.model.save_checkpoint(&stem, &metadata)?;
        self.classifier = Some(output.model);

        let test = self.test_summary()?;
        tracing::info!(
            path = %stem.display(),
            auc = ?test.auroc,
            acc = test.accuracy,
            "classifier trained"
        );
        Ok(ClassifierReport {
            best_epoch: output.best_epoch,
            best_valid_loss: output.best_valid_loss,
            best_valid_auroc: output.best_valid_auroc,
            test,
            training_time_secs: output.training_time_secs,
        })
    }

    /// Load the classifier checkpoint of this fold.
    ///
    /// # Errors
    ///
    /// Missing or mismatching checkpoint.
    pub fn load_classifier(&mut self) -> Result<()> {
        let stem = self.paths.classifier_stem(self.cv());
        let metadata = expect_kind(&stem, CLASSIFIER_KIND)?;
        let model_config: StateClassifierConfig = metadata.config()?;
        if model_config.n_vars != self.data.n_vars() {
            return Err(PipelineError::InvalidConfig(format!(
                "checkpoint {} expects {} features, data has {}",
                stem.display(),
                model_config.n_vars,
                self.data.n_vars()
            )));
        }
        let model = model_config
            .init::<TrainBackend>(&self.device)
            .load_checkpoint(&stem, &self.device)?;
        tracing::info!(path = %stem.display(), "classifier loaded");
        self.classifier = Some(model);
        Ok(())
    }

    fn classifier(&self) -> Result<&StateClassifier<TrainBackend>> {
        self.classifier.as_ref().ok_or(PipelineError::NoClassifier)
    }

    /// Batched predictor over the classifier in evaluation mode.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NoClassifier`] before training or loading.
    pub fn predictor(&self) -> Result<ClassifierPredictor<InferBackend>> {
        Ok(ClassifierPredictor::new(
            self.classifier()?.valid(),
            self.device.clone(),
            self.config.test_batch_size(),
        ))
    }

    fn test_summary(&self) -> Result<ClassificationSummary> {
        use txai_explain::Predictor;

        let test = self.data.test();
        let probs = self.predictor()?.predict_proba(test.x())?;
        let labels = test.last_step_labels()?.to_vec();
        Ok(ClassificationSummary::compute(probs.view(), &labels)?)
    }

    /// Train one generator per distinct (generator, window) the given explainers need.
    ///
    /// Returns the checkpoint stems written.
    ///
    /// # Errors
    ///
    /// Training or checkpoint failures.
    pub fn train_generators(&self, specs: &[ExplainerSpec]) -> Result<Vec<PathBuf>> {
        let dls = self.loaders()?;
        let g = &self.config.generator;
        let mut seen = HashSet::new();
        let mut written = Vec::new();

        for spec in specs {
            let (Some(name), Some(horizon)) = (spec.generator_name(), spec.generator_horizon())
            else {
                continue;
            };
            if !seen.insert((name.clone(), horizon)) {
                continue;
            }
            let conditional = match spec {
                ExplainerSpec::WinIT(config) => config.conditional,
                _ => true,
            };
            let generator_config = FeatureGeneratorConfig::new(self.data.n_vars(), horizon)
                .with_hidden_size(g.hidden_size)
                .with_kind(spec.generator_kind())
                .with_conditional(conditional);
            let generator = generator_config.init::<TrainBackend>(&self.device);

            let trainer_config = GeneratorTrainerConfig {
                n_epochs: g.epochs,
                lr: g.lr,
                weight_decay: g.weight_decay,
                early_stopping_patience: g.early_stopping_patience,
                seed: self
                    .mode
                    .seed(Seed::new(self.config.explainers.seed))
                    .derive(&format!("{name}_w{horizon}")),
                ..Default::default()
            };
            tracing::info!(generator = %name, window = horizon, epochs = g.epochs, "training generator");
            let output = GeneratorTrainer::<TrainBackend>::new(trainer_config, self.device.clone())
                .fit_with_loss(
                    generator,
                    &dls,
                    |m, x, t| m.loss_at(x, t),
                    |m, x, t| m.loss_at(x, t),
                )?;

            let stem = self.paths.generator_stem(&name, horizon, self.cv());
            let metadata = CheckpointMetadata::new(GENERATOR_KIND)
                .with_config(&generator_config)?
                .with_best(output.best_epoch, output.best_valid_loss, None);
            output.model.save_checkpoint(&stem, &metadata)?;
            tracing::info!(
                path = %stem.display(),
                best_loss = output.best_valid_loss,
                "generator trained"
            );
            written.push(stem);
        }
        Ok(written)
    }

    fn load_generator(&self, name: &str, window: usize) -> Result<Option<FeatureGenerator<InferBackend>>> {
        let stem = self.paths.generator_stem(name, window, self.cv());
        if !txai_models::checkpoint_exists(&stem) {
            return Ok(None);
        }
        let metadata = expect_kind(&stem, GENERATOR_KIND)?;
        let config: FeatureGeneratorConfig = metadata.config()?;
        let generator = config
            .init::<InferBackend>(&self.device)
            .load_checkpoint(&stem, &self.device)?;
        tracing::debug!(path = %stem.display(), "generator loaded");
        Ok(Some(generator))
    }

    fn winit_sampler(
        &self,
        spec: &ExplainerSpec,
        config: &WinITConfig,
    ) -> Result<Box<dyn CounterfactualSampler>> {
        let reference = self.data.train().x().clone();
        if config.use_data_distribution {
            return Ok(Box::new(MarginalSampler::new(reference, MarginalMode::TimeAligned)?));
        }
        let name = spec.generator_name().unwrap_or_else(|| "winit".to_string());
        if let Some(generator) = self.load_generator(&name, config.window)? {
            return Ok(Box::new(GeneratorSampler::new(generator, self.device.clone())));
        }
        let stem = self.paths.generator_stem(&name, config.window, self.cv());
        if self.config.explainers.allow_marginal_fallback {
            tracing::warn!(
                path = %stem.display(),
                "generator checkpoint missing, sampling counterfactuals from the training data"
            );
            Ok(Box::new(
                MarginalSampler::new(reference, MarginalMode::TimeAligned)?.as_fallback(),
            ))
        } else {
            Err(ExplainError::MissingGenerator(stem).into())
        }
    }

    /// Build the explainer for one run.
    ///
    /// # Errors
    ///
    /// Missing classifier or generator, or invalid explainer settings.
    pub fn build_explainer(&self, spec: &ExplainerSpec) -> Result<Explainer<TrainBackend>> {
        Ok(match spec {
            ExplainerSpec::WinIT(config) => {
                let sampler = self.winit_sampler(spec, config)?;
                Explainer::WinIT(WinIT::new(config.clone(), sampler)?)
            }
            ExplainerSpec::Occlusion {
                kind,
                n_samples,
                seed,
            } => Explainer::Occlusion(Occlusion::new(
                *kind,
                self.data.train().x().clone(),
                *n_samples,
                *seed,
            )?),
            ExplainerSpec::Gradient { method, n_steps } => Explainer::Gradient(
                GradientExplainer::new(self.classifier()?.clone(), self.device.clone(), *method)
                    .with_ig_config(IntegratedGradientsConfig { n_steps: *n_steps })
                    .with_batch_size(self.config.test_batch_size()),
            ),
        })
    }

    /// Explain the test split and save the importance arrays.
    ///
    /// # Errors
    ///
    /// Explainer or I/O failures.
    pub fn explain(&self, spec: &ExplainerSpec) -> Result<Explanation> {
        let explainer = self.build_explainer(spec)?;
        let predictor = self.predictor()?;
        let name = spec.name();
        let start = Instant::now();
        let explanation = explainer.explain(&name, &predictor, self.data.test().x())?;

        let path = self.paths.importance_path(&name, self.cv());
        explanation.importance.save(&path)?;
        if let Some(windowed) = &explanation.windowed {
            windowed.save(self.paths.windowed_path(&name, self.cv()))?;
        }
        tracing::info!(
            explainer = %name,
            origin = ?explanation.origin,
            path = %path.display(),
            secs = start.elapsed().as_secs_f64(),
            "importance saved"
        );
        Ok(explanation)
    }

    /// Load importance saved by an earlier [`ExplanationRunner::explain`].
    ///
    /// # Errors
    ///
    /// [`PipelineError::MissingImportance`] when nothing was saved.
    pub fn load_explanation(&self, spec: &ExplainerSpec) -> Result<Explanation> {
        let name = spec.name();
        let path = self.paths.importance_path(&name, self.cv());
        if !path.exists() {
            return Err(PipelineError::MissingImportance(path));
        }
        let signed = matches!(spec, ExplainerSpec::Gradient { .. });
        let importance = ImportanceMap::load(&path, signed)?;
        let windowed_path = self.paths.windowed_path(&name, self.cv());
        let windowed = if windowed_path.exists() {
            Some(WindowedScores::load(&windowed_path)?)
        } else {
            None
        };
        importance.ensure_matches(TSShape::from(self.data.test().shape()))?;
        tracing::info!(explainer = %name, path = %path.display(), "importance loaded");
        Ok(Explanation {
            explainer: name,
            importance,
            windowed,
            origin: None,
        })
    }

    /// Unmasked test predictions, when performance drop is measured.
    ///
    /// Datasets with ground truth are scored against it instead, unless
    /// `evaluation.drop_on_simulated` is set.
    ///
    /// # Errors
    ///
    /// Missing classifier or prediction failures.
    pub fn performance_baseline(&self) -> Result<Option<PerformanceDrop>> {
        let test = self.data.test();
        if test.ground_truth().is_some() && !self.config.evaluation.drop_on_simulated {
            return Ok(None);
        }
        let labels = test.last_step_labels()?.to_vec();
        Ok(Some(PerformanceDrop::new(&self.predictor()?, test.x(), &labels)?))
    }

    /// Result rows of one explanation.
    ///
    /// # Errors
    ///
    /// Masker, metric or prediction failures.
    pub fn evaluate(
        &self,
        explanation: &Explanation,
        baseline: Option<&PerformanceDrop>,
    ) -> Result<Vec<ResultRow>> {
        let key = RowKey::now(
            self.config.data.name.name(),
            self.config.model_dir(),
            &explanation.explainer,
            self.cv(),
        );
        let test = self.data.test();
        let mut rows = Vec::new();

        if let Some(ground_truth) = test.ground_truth() {
            for metrics in evaluate_ground_truth(explanation, ground_truth)? {
                if self.config.evaluation.aggregate.contains(&metrics.aggregation) {
                    tracing::info!(
                        explainer = %explanation.explainer,
                        aggregation = %metrics.aggregation,
                        auroc = ?metrics.auroc,
                        auprc = ?metrics.auprc,
                        "ground-truth scores"
                    );
                    rows.push(key.ground_truth_row(&metrics));
                }
            }
        }

        if let Some(baseline) = baseline {
            let predictor = self.predictor()?;
            let absolutize = explanation.importance.is_signed();
            for masker_config in self.config.masker_configs(absolutize) {
                let masker = Masker::new(masker_config)?;
                let outcome = masker.mask_explanation(test.x(), explanation)?;
                let metrics = baseline.evaluate(&predictor, &outcome)?;
                tracing::info!(
                    explainer = %explanation.explainer,
                    masker = %masker.name(),
                    auc_drop = ?metrics.auc_drop,
                    avg_pred_diff = metrics.avg_pred_diff,
                    "performance drop"
                );
                rows.push(key.drop_row(masker.name(), &metrics));
            }
        }
        Ok(rows)
    }

    /// Run the steps enabled in `config.steps`.
    ///
    /// Rows are appended after each explainer. If appending fails, every
    /// row of the run so far goes to the table's `.bak` file before the
    /// error is returned.
    ///
    /// # Errors
    ///
    /// The first failing step.
    pub fn run(&mut self) -> Result<RunSummary> {
        let start = Instant::now();
        let steps = self.config.steps.clone();

        if steps.train {
            self.train_classifier()?;
        } else {
            self.load_classifier()?;
        }

        let specs = self.config.explainer_specs()?;
        if steps.traingen {
            self.train_generators(&specs)?;
        }

        let table = ResultsTable::new(self.paths.results_path());
        let baseline = if steps.eval {
            self.performance_baseline()?
        } else {
            None
        };

        let mut explainers = Vec::with_capacity(specs.len());
        let mut all_rows: Vec<ResultRow> = Vec::new();
        for spec in &specs {
            let explanation = if steps.skipexplain {
                self.load_explanation(spec)?
            } else {
                self.explain(spec)?
            };
            explainers.push(explanation.explainer.clone());

            if steps.eval {
                let rows = self.evaluate(&explanation, baseline.as_ref())?;
                all_rows.extend(rows.iter().cloned());
                if let Err(e) = table.append(&rows) {
                    match table.append_backup(&all_rows) {
                        Ok(path) => tracing::error!(path = %path.display(), "results table write failed, rows saved to backup"),
                        Err(backup) => tracing::error!(error = %backup, "results backup failed"),
                    }
                    return Err(e.into());
                }
            }
        }

        let summary = RunSummary {
            explainers,
            rows: all_rows.len(),
            results_path: table.path().to_path_buf(),
            elapsed_secs: start.elapsed().as_secs_f64(),
        };
        tracing::info!(
            rows = summary.rows,
            secs = summary.elapsed_secs,
            "run finished"
        );
        Ok(summary)
    }
}
