//! Seeded spike-train data with a known salient cell.
//!
//! Each series has `n_vars` features of Gaussian noise. Feature 0 carries at
//! most one spike; the label is 0 before the spike and 1 from `delay` steps
//! after it to the end of the series. The spike cell is the only salient
//! observation, which makes this the smallest dataset on which an explainer
//! can be checked against ground truth.

use std::path::Path;

use ndarray::{Array2, Array3};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::dataset::TSDataset;
use crate::error::Result;
use crate::io::{write_npy, write_npz};
use crate::sources::DatasetKind;
use txai_core::{Seed, Split};

/// Parameters of the spike generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpikeConfig {
    /// Number of training series.
    pub n_train: usize,
    /// Number of test series.
    pub n_test: usize,
    /// Features per series.
    pub n_vars: usize,
    /// Timesteps per series.
    pub seq_len: usize,
    /// Share of series that contain a spike.
    pub spike_fraction: f32,
    /// Steps between the spike and the label flip.
    pub delay: usize,
    /// Noise standard deviation.
    pub noise: f32,
    /// Spike height.
    pub amplitude: f32,
    /// Generator seed.
    pub seed: Seed,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            n_train: 800,
            n_test: 200,
            n_vars: 3,
            seq_len: 50,
            spike_fraction: 0.5,
            delay: 0,
            noise: 0.1,
            amplitude: 3.0,
            seed: Seed::new(1234),
        }
    }
}

/// Generated spike data.
#[derive(Debug, Clone)]
pub struct SpikeData {
    /// Training series with per-step labels.
    pub train: TSDataset,
    /// Test series with per-step labels and ground truth.
    pub test: TSDataset,
}

impl SpikeConfig {
    /// Generate the train and test sets.
    ///
    /// # Errors
    ///
    /// Only fails on internal shape inconsistencies.
    pub fn generate(&self) -> Result<SpikeData> {
        let mut rng = self.seed.to_rng();
        let (x, y, _) = self.sample(self.n_train, &mut rng);
        let train = TSDataset::from_arrays(x, Some(y))?;
        let (x, y, gt) = self.sample(self.n_test, &mut rng);
        let test = TSDataset::from_arrays(x, Some(y))?.with_ground_truth(gt)?;
        Ok(SpikeData { train, test })
    }

    fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> (Array3<f32>, Array2<f32>, Array3<f32>) {
        let (v, l) = (self.n_vars, self.seq_len);
        let mut x = Array3::<f32>::zeros((n, v, l));
        let mut y = Array2::<f32>::zeros((n, l));
        let mut gt = Array3::<f32>::zeros((n, v, l));

        for i in 0..n {
            for f in 0..v {
                for t in 0..l {
                    let z: f32 = StandardNormal.sample(rng);
                    x[[i, f, t]] = self.noise * z;
                }
            }
            // Spikes start at t = 1 so the first step is never salient.
            if l > 1 && rng.gen::<f32>() < self.spike_fraction {
                let t_spike = rng.gen_range(1..l);
                x[[i, 0, t_spike]] += self.amplitude;
                gt[[i, 0, t_spike]] = 1.0;
                for t in (t_spike + self.delay).min(l)..l {
                    y[[i, t]] = 1.0;
                }
            }
        }
        (x, y, gt)
    }
}

impl SpikeData {
    /// Write the data in the registry layout under `{data_dir}/spike/`.
    ///
    /// # Errors
    ///
    /// Propagates I/O and encoding errors.
    pub fn write(&self, data_dir: impl AsRef<Path>) -> Result<()> {
        let kind = DatasetKind::Spike;
        let data_dir = data_dir.as_ref();
        write_npz(kind.split_path(data_dir, Split::Train), self.train.x(), self.train.y())?;
        write_npz(kind.split_path(data_dir, Split::Test), self.test.x(), self.test.y())?;
        if let Some(gt) = self.test.ground_truth() {
            write_npy(kind.ground_truth_path(data_dir), gt)?;
        }
        tracing::info!(path = %kind.dir(data_dir).display(), "wrote spike dataset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::LoadOptions;

    fn small() -> SpikeConfig {
        SpikeConfig {
            n_train: 40,
            n_test: 10,
            seq_len: 12,
            ..SpikeConfig::default()
        }
    }

    #[test]
    fn test_labels_follow_spike() {
        let data = small().generate().unwrap();
        let x = data.test.x();
        let y = data.test.y().unwrap();
        let gt = data.test.ground_truth().unwrap();
        for i in 0..data.test.len() {
            match (0..12).find(|&t| gt[[i, 0, t]] == 1.0) {
                Some(t) => {
                    assert!(x[[i, 0, t]] > 1.0);
                    assert_eq!(y[[i, t]], 1.0);
                    assert!(t == 0 || y[[i, t - 1]] == 0.0);
                }
                None => assert!(y.row(i).iter().all(|v| *v == 0.0)),
            }
        }
    }

    #[test]
    fn test_generation_is_seeded() {
        let a = small().generate().unwrap();
        let b = small().generate().unwrap();
        assert_eq!(a.train.x(), b.train.x());
    }

    #[test]
    fn test_background_noise_has_configured_std() {
        let config = SpikeConfig {
            n_train: 400,
            n_test: 1,
            noise: 0.5,
            ..SpikeConfig::default()
        };
        let data = config.generate().unwrap();
        // feature 1 never carries a spike
        let values: Vec<f32> = data
            .train
            .x()
            .slice(ndarray::s![.., 1, ..])
            .iter()
            .copied()
            .collect();
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
        assert!(mean.abs() < 0.02, "mean {mean}");
        assert!((var.sqrt() - 0.5).abs() < 0.02, "std {}", var.sqrt());
    }

    #[test]
    fn test_written_data_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        small().generate().unwrap().write(dir.path()).unwrap();
        let data = DatasetKind::Spike.load(dir.path(), &LoadOptions::default()).unwrap();
        assert_eq!(data.train().len() + data.valid().len(), 40);
        assert_eq!(data.test().ground_truth().unwrap().dim(), (10, 3, 12));
    }
}
