//! Run configuration.
//!
//! A [`RunConfig`] is read from YAML; every key is optional and falls back
//! to its default. Command-line flags are applied on top through
//! [`ConfigOverrides`].

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{PipelineError, Result};
use txai_data::DatasetKind;
use txai_eval::{Direction, MaskMethod, MaskerConfig, SubstitutionMode, TopK};
use txai_explain::{Aggregation, Divergence, ExplainerKind, ExplainerSettings, ExplainerSpec};
use txai_models::{GeneratorKind, ModelType};

/// Default location of the config file.
pub const DEFAULT_CONFIG_PATH: &str = "config/main.yaml";

/// Complete settings of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Dataset and fold.
    pub data: DataSection,
    /// Classifier.
    pub model: ModelSection,
    /// Feature generators.
    pub generator: GeneratorSection,
    /// Explainers to run.
    pub explainers: ExplainerSection,
    /// Masking evaluation.
    pub evaluation: EvaluationSection,
    /// Output locations.
    pub paths: PathSection,
    /// Which steps of `run` execute.
    pub steps: StepFlags,
    /// Reproducible runs; `TXAI_DETERMINISTIC` overrides it.
    pub deterministic: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data: DataSection::default(),
            model: ModelSection::default(),
            generator: GeneratorSection::default(),
            explainers: ExplainerSection::default(),
            evaluation: EvaluationSection::default(),
            paths: PathSection::default(),
            steps: StepFlags::default(),
            deterministic: true,
        }
    }
}

/// Dataset settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    /// Registry name.
    pub name: DatasetKind,
    /// Directory holding one sub-directory per dataset.
    pub path: PathBuf,
    /// Seed of the fold split and of training shuffles.
    pub seed: u64,
    /// Cross-validation fold.
    pub cv: usize,
    /// Share of the training file used for fitting.
    pub train_ratio: f32,
    /// Training batch size.
    pub batch_size: usize,
    /// Test batch size; the dataset default when unset.
    pub test_batch_size: Option<usize>,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            name: DatasetKind::Spike,
            path: PathBuf::from("data"),
            seed: 1234,
            cv: 0,
            train_ratio: 0.8,
            batch_size: 100,
            test_batch_size: None,
        }
    }
}

/// Classifier settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// Architecture.
    #[serde(rename = "type")]
    pub model_type: ModelType,
    /// Hidden units.
    pub hidden_size: usize,
    /// Stacked layers.
    pub num_layers: usize,
    /// Dropout before the output layer.
    pub dropout: f64,
    /// Learning rate; the dataset default when unset.
    pub lr: Option<f64>,
    /// Epochs; the dataset and model default when unset.
    pub epochs: Option<usize>,
    /// Adam weight decay.
    pub weight_decay: f32,
    /// Early stopping patience (0 = disabled).
    pub early_stopping_patience: usize,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            model_type: ModelType::Gru,
            hidden_size: 200,
            num_layers: 1,
            dropout: 0.5,
            lr: None,
            epochs: None,
            weight_decay: 0.0,
            early_stopping_patience: 0,
        }
    }
}

/// Feature generator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSection {
    /// Training epochs.
    pub epochs: usize,
    /// Hidden units.
    pub hidden_size: usize,
    /// Learning rate.
    pub lr: f64,
    /// Adam weight decay.
    pub weight_decay: f32,
    /// Early stopping patience (0 = disabled).
    pub early_stopping_patience: usize,
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            epochs: 300,
            hidden_size: 100,
            lr: 1e-3,
            weight_decay: 0.0,
            early_stopping_patience: 20,
        }
    }
}

/// Explainer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainerSection {
    /// Explainer names (`winit`, `fo`, `afo`, `ig`, `ixg`).
    pub names: Vec<String>,
    /// WinIT windows.
    pub windows: Vec<usize>,
    /// WinIT divergences.
    pub divergences: Vec<Divergence>,
    /// Counterfactual draws.
    pub samples: usize,
    /// Seed of the explainers' samplers.
    pub seed: u64,
    /// One generator over all features.
    pub joint: bool,
    /// Condition generators on the history.
    pub conditional: bool,
    /// Draw WinIT counterfactuals from the training data.
    pub use_data_distribution: bool,
    /// Integrated Gradients steps.
    pub ig_steps: usize,
    /// Use the training data when a generator checkpoint is missing.
    pub allow_marginal_fallback: bool,
}

impl Default for ExplainerSection {
    fn default() -> Self {
        let settings = ExplainerSettings::default();
        Self {
            names: vec!["winit".to_string()],
            windows: vec![10],
            divergences: settings.divergences,
            samples: settings.n_samples,
            seed: settings.seed,
            joint: settings.joint,
            conditional: settings.conditional,
            use_data_distribution: settings.use_data_distribution,
            ig_steps: settings.ig_steps,
            allow_marginal_fallback: false,
        }
    }
}

/// Family of maskers requested for evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropMode {
    /// `top` observations per series with each mask method.
    Local,
    /// `toppc` of all observations with each mask method.
    Global,
    /// Balanced `std` masking of `top` cells per series.
    Bal,
}

impl FromStr for DropMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(DropMode::Local),
            "global" => Ok(DropMode::Global),
            "bal" => Ok(DropMode::Bal),
            other => Err(PipelineError::InvalidConfig(format!("unknown drop mode {other}"))),
        }
    }
}

/// Evaluation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSection {
    /// Masker families.
    pub drop: Vec<DropMode>,
    /// Mask methods for `local` and `global`.
    pub mask: Vec<MaskMethod>,
    /// Observations per series for local maskers.
    pub top: usize,
    /// Fraction of all observations for global maskers.
    pub toppc: f64,
    /// Aggregations of windowed scores.
    pub aggregate: Vec<Aggregation>,
    /// Seed of tie shuffling.
    pub mask_seed: u64,
    /// Remove or keep, for substitution methods.
    pub mode: SubstitutionMode,
    /// Top or bottom of the ranking, for substitution methods.
    pub direction: Direction,
    /// Also measure performance drop on datasets with ground truth.
    pub drop_on_simulated: bool,
}

impl Default for EvaluationSection {
    fn default() -> Self {
        Self {
            drop: vec![DropMode::Local, DropMode::Global, DropMode::Bal],
            mask: vec![MaskMethod::Std, MaskMethod::End],
            top: 50,
            toppc: 0.05,
            aggregate: vec![Aggregation::Mean],
            mask_seed: 42,
            mode: SubstitutionMode::Remove,
            direction: Direction::Top,
            drop_on_simulated: false,
        }
    }
}

/// Output locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSection {
    /// Importance arrays and results.
    pub out: PathBuf,
    /// Model checkpoints.
    pub ckpt: PathBuf,
    /// Log files; none when unset.
    pub log: Option<PathBuf>,
    /// Results file name inside the dataset output directory.
    pub result_file: String,
}

impl Default for PathSection {
    fn default() -> Self {
        Self {
            out: PathBuf::from("output"),
            ckpt: PathBuf::from("ckpt"),
            log: Some(PathBuf::from("logs")),
            result_file: "results.csv".to_string(),
        }
    }
}

/// Steps of a full run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepFlags {
    /// Train the classifier instead of loading it.
    pub train: bool,
    /// Train generators.
    pub traingen: bool,
    /// Load saved importance instead of explaining.
    pub skipexplain: bool,
    /// Evaluate importance.
    pub eval: bool,
}

impl Default for StepFlags {
    fn default() -> Self {
        Self {
            train: true,
            traingen: true,
            skipexplain: false,
            eval: true,
        }
    }
}

/// Values given on the command line; `None` and empty lists keep the file's value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    /// Dataset.
    pub data: Option<DatasetKind>,
    /// Fold.
    pub cv: Option<usize>,
    /// Explainer names.
    pub explainers: Vec<String>,
    /// WinIT windows.
    pub windows: Vec<usize>,
    /// Classifier architecture.
    pub model_type: Option<ModelType>,
    /// Classifier epochs.
    pub epochs: Option<usize>,
    /// Classifier learning rate.
    pub lr: Option<f64>,
    /// Data directory.
    pub data_path: Option<PathBuf>,
    /// Output directory.
    pub out_path: Option<PathBuf>,
    /// Checkpoint directory.
    pub ckpt_path: Option<PathBuf>,
}

impl RunConfig {
    /// Parse YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for malformed YAML.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|source| PipelineError::Config {
            path: PathBuf::from("<string>"),
            source,
        })
    }

    /// Read and validate a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error for an unreadable file, [`PipelineError::Config`]
    /// for malformed YAML and [`PipelineError::InvalidConfig`] for bad values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: RunConfig =
            serde_yaml::from_str(&text).map_err(|source| PipelineError::Config {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as YAML.
    ///
    /// # Errors
    ///
    /// Propagates I/O and encoding errors.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_yaml::to_string(self).map_err(|source| PipelineError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Apply command-line values.
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(data) = overrides.data {
            self.data.name = data;
        }
        if let Some(cv) = overrides.cv {
            self.data.cv = cv;
        }
        if !overrides.explainers.is_empty() {
            self.explainers.names = overrides.explainers.clone();
        }
        if !overrides.windows.is_empty() {
            self.explainers.windows = overrides.windows.clone();
        }
        if let Some(model_type) = overrides.model_type {
            self.model.model_type = model_type;
        }
        if let Some(epochs) = overrides.epochs {
            self.model.epochs = Some(epochs);
        }
        if let Some(lr) = overrides.lr {
            self.model.lr = Some(lr);
        }
        if let Some(path) = &overrides.data_path {
            self.data.path = path.clone();
        }
        if let Some(path) = &overrides.out_path {
            self.paths.out = path.clone();
        }
        if let Some(path) = &overrides.ckpt_path {
            self.paths.ckpt = path.clone();
        }
    }

    /// Check value ranges and reject repeated list entries.
    ///
    /// A repeated explainer, window, divergence, mask method, drop mode or
    /// aggregation would append the same result row twice.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the offending key, or
    /// the explainer error for an unknown or unsupported explainer name.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));
        if !(self.data.train_ratio > 0.0 && self.data.train_ratio < 1.0) {
            return invalid(format!("data.train_ratio {} is outside (0, 1)", self.data.train_ratio));
        }
        if self.data.batch_size == 0 || self.data.test_batch_size == Some(0) {
            return invalid("batch sizes must be positive".to_string());
        }
        if self.model.num_layers == 0 || self.model.hidden_size == 0 {
            return invalid("model.num_layers and model.hidden_size must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return invalid(format!("model.dropout {} is outside [0, 1)", self.model.dropout));
        }
        if self.explainers.windows.contains(&0) {
            return invalid("explainers.windows must be positive".to_string());
        }
        if self.explainers.samples == 0 {
            return invalid("explainers.samples must be positive".to_string());
        }
        if self.evaluation.top == 0 {
            return invalid("evaluation.top must be positive".to_string());
        }
        if !(self.evaluation.toppc > 0.0 && self.evaluation.toppc <= 1.0) {
            return invalid(format!("evaluation.toppc {} is outside (0, 1]", self.evaluation.toppc));
        }

        let kinds = self
            .explainers
            .names
            .iter()
            .map(|name| name.parse::<ExplainerKind>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let e = &self.evaluation;
        let repeats = [
            ("explainers.names", first_repeat(&kinds)),
            ("explainers.windows", first_repeat(&self.explainers.windows)),
            ("explainers.divergences", first_repeat(&self.explainers.divergences)),
            ("evaluation.mask", first_repeat(&e.mask)),
            ("evaluation.drop", first_repeat(&e.drop)),
            ("evaluation.aggregate", first_repeat(&e.aggregate)),
        ];
        if let Some((key, value)) = repeats
            .into_iter()
            .find_map(|(key, value)| value.map(|v| (key, v)))
        {
            return invalid(format!("{key} lists {value} more than once"));
        }
        Ok(())
    }

    /// Directory name of the classifier family, e.g. `gru1layer`.
    pub fn model_dir(&self) -> String {
        self.model.model_type.dir_name(self.model.num_layers)
    }

    /// Classifier learning rate.
    pub fn learning_rate(&self) -> f64 {
        self.model
            .lr
            .unwrap_or_else(|| self.data.name.default_learning_rate())
    }

    /// Classifier epochs; MIMIC has per-architecture defaults.
    pub fn classifier_epochs(&self) -> usize {
        if let Some(epochs) = self.model.epochs {
            return epochs;
        }
        match (self.data.name, self.model.model_type) {
            (DatasetKind::Mimic, ModelType::Gru) => 100,
            (DatasetKind::Mimic, ModelType::Conv) => 10,
            (DatasetKind::Mimic, ModelType::Lstm) => 30,
            _ => 50,
        }
    }

    /// Test batch size.
    pub fn test_batch_size(&self) -> usize {
        self.data
            .test_batch_size
            .unwrap_or_else(|| self.data.name.default_test_batch_size())
    }

    /// Settings shared by the requested explainers.
    pub fn explainer_settings(&self) -> ExplainerSettings {
        let e = &self.explainers;
        ExplainerSettings {
            n_samples: e.samples,
            seed: e.seed,
            divergences: e.divergences.clone(),
            ig_steps: e.ig_steps,
            joint: e.joint,
            conditional: e.conditional,
            use_data_distribution: e.use_data_distribution,
        }
    }

    /// Expand the requested explainers into runs.
    ///
    /// # Errors
    ///
    /// Unknown or unsupported explainer names.
    pub fn explainer_specs(&self) -> Result<Vec<ExplainerSpec>> {
        Ok(ExplainerSpec::resolve(
            &self.explainers.names,
            &self.explainers.windows,
            &self.explainer_settings(),
        )?)
    }

    /// Generator layout used for WinIT.
    pub fn generator_kind(&self) -> GeneratorKind {
        if self.explainers.joint {
            GeneratorKind::Joint
        } else {
            GeneratorKind::PerFeature
        }
    }

    /// Masker settings for every (drop mode, aggregation, mask method).
    ///
    /// `absolutize` is set for explainers with signed output. Substitution
    /// mode and direction only reach the cell-substitution methods.
    pub fn masker_configs(&self, absolutize: bool) -> Vec<MaskerConfig> {
        let e = &self.evaluation;
        let mut configs = Vec::new();
        for &drop in &e.drop {
            for &aggregation in &e.aggregate {
                let (methods, top, balanced) = match drop {
                    DropMode::Bal => (vec![MaskMethod::Std], TopK::Count(e.top), true),
                    DropMode::Local => (e.mask.clone(), TopK::Count(e.top), false),
                    DropMode::Global => (e.mask.clone(), TopK::Fraction(e.toppc), false),
                };
                for method in methods {
                    let mut config = MaskerConfig::new(method, top)
                        .with_balanced(balanced)
                        .with_seed(e.mask_seed)
                        .with_absolutize(absolutize)
                        .with_aggregation(aggregation);
                    if !method.is_carry_forward() {
                        config = config.with_mode(e.mode).with_direction(e.direction);
                    }
                    configs.push(config);
                }
            }
        }
        configs
    }
}

/// The first entry that also appears earlier in `items`, formatted.
fn first_repeat<T: PartialEq + std::fmt::Debug>(items: &[T]) -> Option<String> {
    items
        .iter()
        .enumerate()
        .find(|(i, item)| items[..*i].contains(item))
        .map(|(_, item)| format!("{item:?}").to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = RunConfig::from_yaml_str(
            "data:\n  name: mimic\n  cv: 2\nmodel:\n  type: CONV\nexplainers:\n  names: [winit, fo]\n  windows: [5, 10]\n",
        )
        .unwrap();
        assert_eq!(config.data.name, DatasetKind::Mimic);
        assert_eq!(config.data.cv, 2);
        assert_eq!(config.data.train_ratio, 0.8);
        assert_eq!(config.model.model_type, ModelType::Conv);
        assert_eq!(config.model.hidden_size, 200);
        assert!(config.deterministic);
        assert_eq!(config.explainers.windows, vec![5, 10]);

        assert_eq!(config.classifier_epochs(), 10);
        assert_eq!(config.learning_rate(), 1e-4);
        assert_eq!(config.test_batch_size(), 1000);
        assert_eq!(config.model_dir(), "conv");
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = RunConfig::from_yaml_str(include_str!("../../../../config/main.yaml")).unwrap();
        assert_eq!(config, RunConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            RunConfig::from_yaml_str("data: [not, a, map]"),
            Err(PipelineError::Config { .. })
        ));
        assert!(RunConfig::from_yaml_str("data:\n  name: nope\n").is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = RunConfig::default();
        config.apply(&ConfigOverrides {
            data: Some(DatasetKind::State),
            cv: Some(3),
            windows: vec![4],
            epochs: Some(7),
            out_path: Some(PathBuf::from("/tmp/out")),
            ..Default::default()
        });
        assert_eq!(config.data.name, DatasetKind::State);
        assert_eq!(config.data.cv, 3);
        assert_eq!(config.explainers.windows, vec![4]);
        assert_eq!(config.explainers.names, vec!["winit".to_string()]);
        assert_eq!(config.classifier_epochs(), 7);
        assert_eq!(config.paths.out, PathBuf::from("/tmp/out"));
        assert_eq!(config.learning_rate(), 1e-3);
    }

    #[test]
    fn test_masker_configs() {
        let mut config = RunConfig::default();
        config.evaluation.aggregate = vec![Aggregation::Mean, Aggregation::Max];
        config.evaluation.mode = SubstitutionMode::Keep;
        config.evaluation.mask = vec![MaskMethod::Std, MaskMethod::Zero];

        let configs = config.masker_configs(true);
        // local and global: 2 methods each; bal: std only; all times 2 aggregations
        assert_eq!(configs.len(), (2 + 2 + 1) * 2);
        assert!(configs.iter().all(|c| c.absolutize));
        assert_eq!(configs.iter().filter(|c| c.balanced).count(), 2);
        assert!(configs
            .iter()
            .filter(|c| c.method == MaskMethod::Std)
            .all(|c| c.mode == SubstitutionMode::Remove));
        assert!(configs
            .iter()
            .filter(|c| c.method == MaskMethod::Zero)
            .all(|c| c.mode == SubstitutionMode::Keep));
        for c in configs {
            assert!(txai_eval::Masker::new(c).is_ok());
        }
    }

    #[test]
    fn test_validate_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.yaml");

        let mut config = RunConfig::default();
        config.explainers.names = vec!["ig".to_string()];
        config.save(&path).unwrap();
        assert_eq!(RunConfig::load(&path).unwrap(), config);

        config.evaluation.toppc = 1.5;
        config.save(&path).unwrap();
        assert!(matches!(
            RunConfig::load(&path),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_repeated_entries_are_rejected() {
        let mut config = RunConfig::default();
        config.explainers.names = vec!["fo".to_string(), "fo".to_string()];
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(msg)) if msg.contains("explainers.names")
        ));

        // aliases of the same explainer collide too
        config.explainers.names = vec!["ixg".to_string(), "InputXGradient".to_string()];
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));

        let mut config = RunConfig::default();
        config.evaluation.mask = vec![MaskMethod::Std, MaskMethod::Std];
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(msg)) if msg.contains("evaluation.mask")
        ));

        let mut config = RunConfig::default();
        config.apply(&ConfigOverrides {
            windows: vec![5, 10, 5],
            ..Default::default()
        });
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(msg)) if msg.contains("explainers.windows")
        ));

        let mut config = RunConfig::default();
        config.evaluation.aggregate = vec![Aggregation::Max, Aggregation::Mean, Aggregation::Max];
        assert!(config.validate().is_err());
        config.evaluation.aggregate = vec![Aggregation::Max, Aggregation::Mean];
        config.validate().unwrap();
    }

    #[test]
    fn test_valid_config_gives_unique_rows() {
        let mut config = RunConfig::default();
        config.explainers.names = vec!["winit".to_string(), "fo".to_string(), "ig".to_string()];
        config.explainers.windows = vec![5, 10];
        config.explainers.divergences = vec![Divergence::Pd, Divergence::Kl];
        config.evaluation.mask = vec![MaskMethod::Std, MaskMethod::End];
        config.evaluation.aggregate = vec![Aggregation::Mean, Aggregation::Max];
        config.validate().unwrap();

        let specs: Vec<String> = config
            .explainer_specs()
            .unwrap()
            .iter()
            .map(ExplainerSpec::name)
            .collect();
        let unique: std::collections::HashSet<_> = specs.iter().collect();
        assert_eq!(unique.len(), specs.len());

        let maskers: Vec<String> = config
            .masker_configs(false)
            .into_iter()
            .map(|c| txai_eval::Masker::new(c).unwrap().name())
            .collect();
        let unique: std::collections::HashSet<_> = maskers.iter().collect();
        assert_eq!(unique.len(), maskers.len());
    }

    #[test]
    fn test_drop_mode_parse() {
        assert_eq!("bal".parse::<DropMode>().unwrap(), DropMode::Bal);
        assert!("both".parse::<DropMode>().is_err());
    }
}
