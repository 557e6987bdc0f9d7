//! Feature Occlusion (FO) and Augmented Feature Occlusion (AFO).
//!
//! Each observation `x[i, f, t]` is replaced by a value drawn from the
//! training data and scored by the L1 change of the prediction at `t`,
//! averaged over draws. FO draws from all values of feature `f`; AFO draws
//! from the values of feature `f` at timestep `t`.

use ndarray::{s, Array3};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::divergence::{mean_divergence, Divergence};
use crate::error::{ExplainError, Result};
use crate::importance::ImportanceMap;
use crate::predictor::Predictor;
use crate::sampler::{CounterfactualSampler, MarginalMode, MarginalSampler};

/// Which occlusion variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcclusionKind {
    /// Draw from the whole marginal of the feature.
    Fo,
    /// Draw from the feature at the same timestep.
    Afo,
}

impl OcclusionKind {
    /// `fo` or `afo`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            OcclusionKind::Fo => "fo",
            OcclusionKind::Afo => "afo",
        }
    }

    fn mode(&self) -> MarginalMode {
        match self {
            OcclusionKind::Fo => MarginalMode::Pooled,
            OcclusionKind::Afo => MarginalMode::TimeAligned,
        }
    }
}

/// Occlusion explainer.
#[derive(Debug, Clone)]
pub struct Occlusion {
    kind: OcclusionKind,
    sampler: MarginalSampler,
    n_samples: usize,
    seed: u64,
}

impl Occlusion {
    /// Build from reference (training) series `(M, V, L)`.
    ///
    /// # Errors
    ///
    /// Returns an error for empty reference data or zero draws.
    pub fn new(
        kind: OcclusionKind,
        reference: Array3<f32>,
        n_samples: usize,
        seed: u64,
    ) -> Result<Self> {
        if n_samples == 0 {
            return Err(ExplainError::InvalidConfig(
                "n_samples must be positive".to_string(),
            ));
        }
        Ok(Self {
            kind,
            sampler: MarginalSampler::new(reference, kind.mode())?,
            n_samples,
            seed,
        })
    }

    /// The variant.
    pub fn kind(&self) -> OcclusionKind {
        self.kind
    }

    /// `(N, L, V)` importance of `x (N, V, L)`.
    ///
    /// # Errors
    ///
    /// Propagates predictor failures.
    pub fn attribute<P: Predictor + ?Sized>(
        &self,
        predictor: &P,
        x: &Array3<f32>,
    ) -> Result<ImportanceMap> {
        let (n, n_vars, seq_len) = x.dim();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut out = Array3::<f32>::zeros((n, n_vars, seq_len));

        for t in 0..seq_len {
            let prefix = x.slice(s![.., .., ..=t]).to_owned();
            let p = predictor.predict_proba(&prefix)?;
            let draws = self.sampler.sample(&prefix, t, 1, self.n_samples, &mut rng)?;

            for f in 0..n_vars {
                let mut batch = Array3::<f32>::zeros((self.n_samples * n, n_vars, t + 1));
                for s_idx in 0..self.n_samples {
                    let mut block = batch.slice_mut(s![s_idx * n..(s_idx + 1) * n, .., ..]);
                    block.assign(&prefix);
                    block
                        .slice_mut(s![.., f, t])
                        .assign(&draws.slice(s![s_idx, .., f, 0]));
                }
                let q = predictor.predict_proba(&batch)?;
                out.slice_mut(s![.., f, t])
                    .assign(&mean_divergence(Divergence::Pd, &p, &q, self.n_samples));
            }
        }
        tracing::debug!(kind = self.kind.as_str(), n, seq_len, "occlusion done");
        Ok(ImportanceMap::from_input_layout(out, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn predictor(x: &Array3<f32>) -> Result<Array2<f32>> {
        let (n, _, len) = x.dim();
        Ok(Array2::from_shape_fn((n, 2), |(i, c)| {
            let p1 = if x[[i, 1, len - 1]] > 0.5 { 0.9 } else { 0.1 };
            if c == 1 {
                p1
            } else {
                1.0 - p1
            }
        }))
    }

    fn reference() -> Array3<f32> {
        Array3::from_shape_fn((8, 2, 4), |(j, _, t)| ((j + t) % 2) as f32)
    }

    #[test]
    fn test_fo_scores_only_the_used_feature() {
        let x = Array3::from_elem((3, 2, 4), 1.0);
        let map = Occlusion::new(OcclusionKind::Fo, reference(), 10, 4)
            .unwrap()
            .attribute(&predictor, &x)
            .unwrap();
        assert_eq!(map.dim(), (3, 4, 2));
        assert!(!map.is_signed());
        assert!(map.values().slice(s![.., .., 0]).iter().all(|v| *v == 0.0));
        assert!(map.values().slice(s![.., .., 1]).iter().any(|v| *v > 0.0));
        assert!(map.values().iter().all(|v| *v <= 1.6 + 1e-6));
    }

    #[test]
    fn test_afo_respects_timestep_distribution() {
        // at every timestep half of the reference series hold 1.0
        let x = Array3::from_elem((1, 2, 4), 1.0);
        let a = Occlusion::new(OcclusionKind::Afo, reference(), 6, 1)
            .unwrap()
            .attribute(&predictor, &x)
            .unwrap();
        let b = Occlusion::new(OcclusionKind::Afo, reference(), 6, 1)
            .unwrap()
            .attribute(&predictor, &x)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(Occlusion::new(OcclusionKind::Afo, reference(), 6, 1).unwrap().kind().as_str(), "afo");
        assert!(Occlusion::new(OcclusionKind::Fo, reference(), 0, 1).is_err());
    }
}
