//! Registry of named experiment datasets and their on-disk layout.
//!
//! Every dataset lives in `{data_dir}/{name}/` as
//! - `train.npz` with `x (N, V, L)` and `y (N, W)`
//! - `test.npz` with the same keys
//! - `test_ground_truth.npy`, a binary `(N_test, V, L)` saliency map, for
//!   synthetic datasets
//!
//! `train.npz` is split into the training and validation parts of the
//! requested CV fold; `test.npz` is used as is.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ndarray::Ix3;
use serde::{Deserialize, Serialize};

use crate::dataset::{TSDataset, TSDatasets};
use crate::error::{DataError, Result};
use crate::io::{read_npy, read_npz};
use crate::splits::cv_split;
use txai_core::{Seed, Split};

/// Whether a dataset is generated with known saliency or recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetFamily {
    /// Generated data; a ground-truth saliency map is available.
    Simulated,
    /// Recorded clinical or industrial data.
    Real,
}

/// A named dataset known to the experiment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// Spike trains where a label flips after a spike in one feature.
    Spike,
    /// Hidden-state process with state-dependent salient features.
    State,
    /// Switching feature process.
    Switch,
    /// L2X-style synthetic data.
    #[serde(rename = "simulated_data_l2x")]
    SimulatedL2X,
    /// Multivariate sequence combination task.
    #[serde(rename = "seqcombmv")]
    SeqCombMV,
    /// MIMIC-III mortality prediction.
    Mimic,
    /// Boiler fault detection.
    Boiler,
    /// MIT-BIH ECG arrhythmia.
    #[serde(rename = "mitecg")]
    MitEcg,
    /// PAMAP2 activity recognition.
    Pam,
}

impl DatasetKind {
    /// Every registered dataset.
    pub const ALL: [DatasetKind; 9] = [
        DatasetKind::Spike,
        DatasetKind::State,
        DatasetKind::Switch,
        DatasetKind::SimulatedL2X,
        DatasetKind::SeqCombMV,
        DatasetKind::Mimic,
        DatasetKind::Boiler,
        DatasetKind::MitEcg,
        DatasetKind::Pam,
    ];

    /// Directory and display name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            DatasetKind::Spike => "spike",
            DatasetKind::State => "state",
            DatasetKind::Switch => "switch",
            DatasetKind::SimulatedL2X => "simulated_data_l2x",
            DatasetKind::SeqCombMV => "seqcombmv",
            DatasetKind::Mimic => "mimic",
            DatasetKind::Boiler => "boiler",
            DatasetKind::MitEcg => "mitecg",
            DatasetKind::Pam => "pam",
        }
    }

    /// Simulated or real.
    #[must_use]
    pub const fn family(&self) -> DatasetFamily {
        match self {
            DatasetKind::Spike
            | DatasetKind::State
            | DatasetKind::Switch
            | DatasetKind::SimulatedL2X
            | DatasetKind::SeqCombMV => DatasetFamily::Simulated,
            DatasetKind::Mimic | DatasetKind::Boiler | DatasetKind::MitEcg | DatasetKind::Pam => {
                DatasetFamily::Real
            }
        }
    }

    /// True if importances are scored against a ground-truth saliency map.
    #[must_use]
    pub const fn is_simulated(&self) -> bool {
        matches!(self.family(), DatasetFamily::Simulated)
    }

    /// True if the classifier is trained on a label at every timestep.
    ///
    /// The other datasets are trained on the last timestep only.
    #[must_use]
    pub const fn trains_on_all_steps(&self) -> bool {
        !matches!(
            self,
            DatasetKind::SeqCombMV
                | DatasetKind::Mimic
                | DatasetKind::Boiler
                | DatasetKind::MitEcg
                | DatasetKind::Pam
        )
    }

    /// Test batch size used when the config leaves it unset.
    #[must_use]
    pub const fn default_test_batch_size(&self) -> usize {
        match self.family() {
            DatasetFamily::Simulated => 300,
            DatasetFamily::Real => 1000,
        }
    }

    /// Classifier learning rate used when the config leaves it unset.
    #[must_use]
    pub const fn default_learning_rate(&self) -> f64 {
        match self {
            DatasetKind::Mimic => 1e-4,
            _ => 1e-3,
        }
    }

    /// Directory holding this dataset's files.
    #[must_use]
    pub fn dir(&self, data_dir: impl AsRef<Path>) -> PathBuf {
        data_dir.as_ref().join(self.name())
    }

    /// Path of the archive for `split` (`train` or `test`).
    #[must_use]
    pub fn split_path(&self, data_dir: impl AsRef<Path>, split: Split) -> PathBuf {
        self.dir(data_dir).join(format!("{}.npz", split.file_stem()))
    }

    /// Path of the test-set ground-truth saliency map.
    #[must_use]
    pub fn ground_truth_path(&self, data_dir: impl AsRef<Path>) -> PathBuf {
        self.dir(data_dir).join("test_ground_truth.npy")
    }

    /// Load fold `options.cv` of this dataset.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::MissingFile`] for a missing archive, or the
    /// format and shape errors of the parts.
    pub fn load(&self, data_dir: impl AsRef<Path>, options: &LoadOptions) -> Result<TSDatasets> {
        let data_dir = data_dir.as_ref();

        let (x, y) = read_npz(self.split_path(data_dir, Split::Train))?;
        let full_train = TSDataset::from_arrays(x, y)?;

        let (x, y) = read_npz(self.split_path(data_dir, Split::Test))?;
        let mut test = TSDataset::from_arrays(x, y)?;

        if self.is_simulated() {
            let gt_path = self.ground_truth_path(data_dir);
            if gt_path.exists() {
                test = test.with_ground_truth(read_npy::<Ix3, _>(&gt_path)?)?;
            } else {
                tracing::warn!(
                    dataset = self.name(),
                    path = %gt_path.display(),
                    "simulated dataset has no ground-truth file"
                );
            }
        }

        let fold = cv_split(full_train.len(), options.cv, options.train_ratio, options.seed)?;
        let train = full_train.subset(&fold.train)?;
        let valid = full_train.subset(&fold.valid)?;

        tracing::info!(
            dataset = self.name(),
            cv = options.cv,
            train = train.len(),
            valid = valid.len(),
            test = test.len(),
            n_vars = train.n_vars(),
            seq_len = train.seq_len(),
            "loaded dataset"
        );
        TSDatasets::new(train, valid, test, options.cv)
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatasetKind {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "mitecg1" => Ok(DatasetKind::MitEcg),
            "l2x" => Ok(DatasetKind::SimulatedL2X),
            other => DatasetKind::ALL
                .into_iter()
                .find(|k| k.name() == other)
                .ok_or_else(|| DataError::UnknownDataset(s.to_string())),
        }
    }
}

/// How to cut a dataset into a fold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Fold index.
    pub cv: usize,
    /// Share of `train.npz` used for fitting; the rest validates.
    pub train_ratio: f32,
    /// Seed of the fold shuffle.
    pub seed: Seed,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            cv: 0,
            train_ratio: 0.8,
            seed: Seed::new(1234),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{write_npy, write_npz};
    use ndarray::{Array2, Array3};

    #[test]
    fn test_parse_names_and_aliases() {
        for kind in DatasetKind::ALL {
            assert_eq!(kind.name().parse::<DatasetKind>().unwrap(), kind);
        }
        assert_eq!("MITECG1".parse::<DatasetKind>().unwrap(), DatasetKind::MitEcg);
        assert!("ucr".parse::<DatasetKind>().is_err());
    }

    #[test]
    fn test_registry_defaults() {
        assert_eq!(DatasetKind::Spike.default_test_batch_size(), 300);
        assert_eq!(DatasetKind::Pam.default_test_batch_size(), 1000);
        assert_eq!(DatasetKind::Mimic.default_learning_rate(), 1e-4);
        assert!(DatasetKind::State.trains_on_all_steps());
        assert!(!DatasetKind::SeqCombMV.trains_on_all_steps());
        assert!(DatasetKind::SeqCombMV.is_simulated());
        assert!(!DatasetKind::Boiler.is_simulated());
    }

    #[test]
    fn test_serde_names_match_registry() {
        let json = serde_json::to_string(&DatasetKind::SimulatedL2X).unwrap();
        assert_eq!(json, "\"simulated_data_l2x\"");
        let kind: DatasetKind = serde_json::from_str("\"mitecg\"").unwrap();
        assert_eq!(kind, DatasetKind::MitEcg);
    }

    #[test]
    fn test_load_fold_with_ground_truth() {
        let dir = tempfile::tempdir().unwrap();
        let kind = DatasetKind::Spike;
        let x = Array3::from_shape_fn((20, 2, 6), |(n, _, _)| n as f32);
        let y = Array2::from_shape_fn((20, 6), |(n, _)| (n % 2) as f32);
        write_npz(kind.split_path(dir.path(), Split::Train), &x, Some(&y)).unwrap();
        let xt = Array3::zeros((4, 2, 6));
        let yt = Array2::zeros((4, 6));
        write_npz(kind.split_path(dir.path(), Split::Test), &xt, Some(&yt)).unwrap();
        write_npy(kind.ground_truth_path(dir.path()), &Array3::<f32>::ones((4, 2, 6))).unwrap();

        let data = kind.load(dir.path(), &LoadOptions::default()).unwrap();
        assert_eq!(data.train().len(), 16);
        assert_eq!(data.valid().len(), 4);
        assert_eq!(data.test().len(), 4);
        assert!(data.test().ground_truth().is_some());
        assert!(data.train().labels_per_step());
    }

    #[test]
    fn test_load_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let err = DatasetKind::Boiler
            .load(dir.path(), &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, DataError::MissingFile(_)));
    }
}
