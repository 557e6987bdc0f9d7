//! File layout of a run.

use std::path::{Path, PathBuf};

use super::config::RunConfig;

/// Checkpoint, importance and results locations for one dataset and model family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    out_dir: PathBuf,
    ckpt_dir: PathBuf,
    result_file: String,
}

impl RunPaths {
    /// `{out}/{model_dir}/{dataset}` and `{ckpt}/{model_dir}/{dataset}`.
    pub fn new(config: &RunConfig) -> Self {
        let model_dir = config.model_dir();
        let dataset = config.data.name.name();
        Self {
            out_dir: config.paths.out.join(&model_dir).join(dataset),
            ckpt_dir: config.paths.ckpt.join(&model_dir).join(dataset),
            result_file: config.paths.result_file.clone(),
        }
    }

    /// Output directory of the dataset.
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Checkpoint directory of the dataset.
    pub fn ckpt_dir(&self) -> &Path {
        &self.ckpt_dir
    }

    /// Classifier checkpoint stem.
    pub fn classifier_stem(&self, cv: usize) -> PathBuf {
        self.ckpt_dir.join(format!("classifier_cv{cv}"))
    }

    /// Generator checkpoint stem.
    pub fn generator_stem(&self, generator: &str, window: usize, cv: usize) -> PathBuf {
        self.ckpt_dir
            .join(format!("generator_{generator}_w{window}_cv{cv}"))
    }

    /// Aggregated importance array.
    pub fn importance_path(&self, explainer: &str, cv: usize) -> PathBuf {
        self.out_dir
            .join("importance")
            .join(format!("{explainer}_cv{cv}.npy"))
    }

    /// Raw windowed scores of windowed explainers.
    pub fn windowed_path(&self, explainer: &str, cv: usize) -> PathBuf {
        self.out_dir
            .join("importance")
            .join(format!("{explainer}_cv{cv}_windowed.npy"))
    }

    /// Results table.
    pub fn results_path(&self) -> PathBuf {
        self.out_dir.join(&self.result_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txai_models::ModelType;

    #[test]
    fn test_layout() {
        let mut config = RunConfig::default();
        config.paths.out = PathBuf::from("out");
        config.paths.ckpt = PathBuf::from("ckpt");
        config.model.num_layers = 2;
        let paths = RunPaths::new(&config);

        assert_eq!(
            paths.classifier_stem(1),
            PathBuf::from("ckpt/gru2layer/spike/classifier_cv1")
        );
        assert_eq!(
            paths.generator_stem("winit_joint", 10, 0),
            PathBuf::from("ckpt/gru2layer/spike/generator_winit_joint_w10_cv0")
        );
        assert_eq!(
            paths.importance_path("winit_w10_pd", 0),
            PathBuf::from("out/gru2layer/spike/importance/winit_w10_pd_cv0.npy")
        );
        assert_eq!(paths.results_path(), PathBuf::from("out/gru2layer/spike/results.csv"));

        config.model.model_type = ModelType::Lstm;
        assert_eq!(RunPaths::new(&config).out_dir(), Path::new("out/lstm/spike"));
    }
}
