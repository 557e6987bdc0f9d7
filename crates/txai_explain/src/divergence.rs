//! Distances between predicted class distributions.

use std::str::FromStr;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{ExplainError, Result};

/// Added inside logarithms.
pub const EPS: f32 = 1e-7;

/// Divergence between an original and a counterfactual prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Divergence {
    /// Kullback-Leibler `KL(p || q)`.
    #[default]
    Kl,
    /// Jensen-Shannon.
    Js,
    /// L1 distance of the probability vectors.
    Pd,
}

impl Divergence {
    /// Name used in explainer names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Divergence::Kl => "kl",
            Divergence::Js => "js",
            Divergence::Pd => "pd",
        }
    }

    /// Divergence of `q` from `p`.
    ///
    /// ```rust
    /// use txai_explain::Divergence;
    ///
    /// let p = [0.5, 0.5];
    /// assert_eq!(Divergence::Pd.compute(&p, &[1.0, 0.0]), 1.0);
    /// assert!(Divergence::Kl.compute(&p, &p).abs() < 1e-6);
    /// ```
    #[must_use]
    pub fn compute(&self, p: &[f32], q: &[f32]) -> f32 {
        match self {
            Divergence::Kl => kl(p, q),
            Divergence::Js => {
                let m: Vec<f32> = p.iter().zip(q).map(|(a, b)| 0.5 * (a + b)).collect();
                0.5 * kl(p, &m) + 0.5 * kl(q, &m)
            }
            Divergence::Pd => p.iter().zip(q).map(|(a, b)| (a - b).abs()).sum(),
        }
    }
}

/// Mean over draws of `D(p_i, q_{s, i})`; `q` stacks draws along rows.
pub(crate) fn mean_divergence(
    metric: Divergence,
    p: &Array2<f32>,
    q: &Array2<f32>,
    n_samples: usize,
) -> Array1<f32> {
    let n = p.nrows();
    Array1::from_shape_fn(n, |i| {
        let p_row = p.row(i).to_vec();
        let total: f32 = (0..n_samples)
            .map(|s_idx| metric.compute(&p_row, &q.row(s_idx * n + i).to_vec()))
            .sum();
        total / n_samples as f32
    })
}

fn kl(p: &[f32], q: &[f32]) -> f32 {
    p.iter()
        .zip(q)
        .map(|(a, b)| a * ((a + EPS).ln() - (b + EPS).ln()))
        .sum()
}

impl std::fmt::Display for Divergence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Divergence {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kl" => Ok(Divergence::Kl),
            "js" => Ok(Divergence::Js),
            "pd" => Ok(Divergence::Pd),
            other => Err(ExplainError::UnknownOption {
                what: "divergence",
                value: other.to_string(),
            }),
        }
    }
}
