//! Importance arrays and their aggregation.
//!
//! An [`ImportanceMap`] is a dense `(N, L, V)` array: one score per series,
//! timestep and feature. Windowed explainers first produce
//! [`WindowedScores`] `(N, L, V, W)`, where entry `[n, t, f, W-1-k]` is the
//! importance of observation `t - k` for the prediction at `t`.

use std::path::Path;
use std::str::FromStr;

use ndarray::{Array3, Array4, Ix3, Ix4, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{ExplainError, Result};
use txai_core::TSShape;
use txai_data::{read_npy, write_npy};

/// How several estimates of one observation are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Arithmetic mean.
    #[default]
    Mean,
    /// Largest value.
    Max,
    /// Value of largest magnitude, sign kept.
    AbsMax,
}

impl Aggregation {
    /// Every method.
    pub const ALL: [Aggregation; 3] = [Aggregation::Mean, Aggregation::Max, Aggregation::AbsMax];

    /// Name used in file and column names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Mean => "mean",
            Aggregation::Max => "max",
            Aggregation::AbsMax => "absmax",
        }
    }

    /// Combine a sequence of estimates; an empty sequence yields 0.
    ///
    /// ```rust
    /// use txai_explain::Aggregation;
    ///
    /// let v = [1.0, -3.0, 2.0];
    /// assert_eq!(Aggregation::Mean.combine(v), 0.0);
    /// assert_eq!(Aggregation::Max.combine(v), 2.0);
    /// assert_eq!(Aggregation::AbsMax.combine(v), -3.0);
    /// ```
    pub fn combine(&self, values: impl IntoIterator<Item = f32>) -> f32 {
        let mut iter = values.into_iter();
        let Some(first) = iter.next() else {
            return 0.0;
        };
        match self {
            Aggregation::Mean => {
                let (sum, count) = iter.fold((first, 1usize), |(s, c), v| (s + v, c + 1));
                sum / count as f32
            }
            Aggregation::Max => iter.fold(first, f32::max),
            Aggregation::AbsMax => iter.fold(first, |best, v| if v.abs() > best.abs() { v } else { best }),
        }
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Aggregation::Mean),
            "max" => Ok(Aggregation::Max),
            "absmax" | "abs_max" => Ok(Aggregation::AbsMax),
            other => Err(ExplainError::UnknownOption {
                what: "aggregation",
                value: other.to_string(),
            }),
        }
    }
}

/// Dense `(N, L, V)` importance scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportanceMap {
    values: Array3<f32>,
    signed: bool,
}

impl ImportanceMap {
    /// Wrap scores where larger means more important.
    #[must_use]
    pub fn new(values: Array3<f32>) -> Self {
        Self {
            values,
            signed: false,
        }
    }

    /// Wrap signed scores whose magnitude is the importance.
    #[must_use]
    pub fn signed(values: Array3<f32>) -> Self {
        Self {
            values,
            signed: true,
        }
    }

    /// Wrap scores laid out `(N, V, L)` like model inputs.
    #[must_use]
    pub fn from_input_layout(values: Array3<f32>, signed: bool) -> Self {
        let values = values.permuted_axes([0, 2, 1]).as_standard_layout().into_owned();
        Self { values, signed }
    }

    /// Scores `(N, L, V)`.
    #[must_use]
    pub fn values(&self) -> &Array3<f32> {
        &self.values
    }

    /// Consume and return the scores.
    #[must_use]
    pub fn into_values(self) -> Array3<f32> {
        self.values
    }

    /// `(N, L, V)`.
    #[must_use]
    pub fn dim(&self) -> (usize, usize, usize) {
        self.values.dim()
    }

    /// True for signed scores.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Scores ready for ranking: absolute values when signed.
    #[must_use]
    pub fn ranking_scores(&self) -> Array3<f32> {
        if self.signed {
            self.values.mapv(f32::abs)
        } else {
            self.values.clone()
        }
    }

    /// Check that the map scores every observation of an `input` batch.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::InvalidShape`] unless the map is
    /// `input.importance_dims()`.
    pub fn ensure_matches(&self, input: TSShape) -> Result<()> {
        if self.dim() != input.importance_dims() {
            return Err(ExplainError::InvalidShape(format!(
                "importance {:?} does not cover input {input}",
                self.dim()
            )));
        }
        Ok(())
    }

    /// Combine maps of equal shape element-wise (e.g. across CV folds).
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::InvalidShape`] for an empty list or unequal
    /// shapes.
    pub fn combine(maps: &[ImportanceMap], aggregation: Aggregation) -> Result<Self> {
        let first = maps
            .first()
            .ok_or_else(|| ExplainError::InvalidShape("no maps to combine".to_string()))?;
        if let Some(map) = maps.iter().find(|m| m.dim() != first.dim()) {
            return Err(ExplainError::InvalidShape(format!(
                "cannot combine {:?} with {:?}",
                map.dim(),
                first.dim()
            )));
        }
        let values = Array3::from_shape_fn(first.dim(), |idx| {
            aggregation.combine(maps.iter().map(|m| m.values[idx]))
        });
        Ok(Self {
            values,
            signed: maps.iter().any(|m| m.signed),
        })
    }

    /// Write the scores to a `.npy` file.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_npy(path, &self.values)?;
        Ok(())
    }

    /// Read scores from a `.npy` file.
    ///
    /// # Errors
    ///
    /// Propagates I/O and format errors.
    pub fn load(path: impl AsRef<Path>, signed: bool) -> Result<Self> {
        Ok(Self {
            values: read_npy::<Ix3, _>(path)?,
            signed,
        })
    }
}

/// Raw `(N, L, V, W)` scores of a windowed explainer.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedScores {
    values: Array4<f32>,
}

impl WindowedScores {
    /// All-zero scores.
    #[must_use]
    pub fn zeros(n: usize, seq_len: usize, n_vars: usize, window: usize) -> Self {
        Self {
            values: Array4::zeros((n, seq_len, n_vars, window)),
        }
    }

    /// Wrap an existing array.
    #[must_use]
    pub fn from_array(values: Array4<f32>) -> Self {
        Self { values }
    }

    /// Window size `W`.
    #[must_use]
    pub fn window(&self) -> usize {
        self.values.dim().3
    }

    /// Scores.
    #[must_use]
    pub fn values(&self) -> &Array4<f32> {
        &self.values
    }

    /// Mutable scores.
    pub fn values_mut(&mut self) -> &mut Array4<f32> {
        &mut self.values
    }

    /// Combine the estimates of every observation into an [`ImportanceMap`].
    ///
    /// Observation `t` is scored by the windows ending at
    /// `t..min(t + W, L)`; in the window ending at `t'` its estimate sits at
    /// position `W - 1 - (t' - t)`.
    #[must_use]
    pub fn aggregate(&self, aggregation: Aggregation) -> ImportanceMap {
        let (n, seq_len, n_vars, window) = self.values.dim();
        let mut out = Array3::<f32>::zeros((n, seq_len, n_vars));
        Zip::indexed(&mut out).for_each(|(i, t, f), slot| {
            let end = (t + window).min(seq_len);
            *slot = aggregation.combine(
                (t..end).map(|t_end| self.values[[i, t_end, f, window - 1 - (t_end - t)]]),
            );
        });
        ImportanceMap::new(out)
    }

    /// Write the raw scores to a `.npy` file.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_npy(path, &self.values)?;
        Ok(())
    }

    /// Read raw scores from a `.npy` file.
    ///
    /// # Errors
    ///
    /// Propagates I/O and format errors.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            values: read_npy::<Ix4, _>(path)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregation_names() {
        for agg in Aggregation::ALL {
            assert_eq!(agg.as_str().parse::<Aggregation>().unwrap(), agg);
        }
        assert!("median".parse::<Aggregation>().is_err());
        assert_eq!(Aggregation::Mean.combine(std::iter::empty()), 0.0);
    }

    #[test]
    fn test_window_aggregation_aligns_positions() {
        // L = 3, W = 2: the estimate of t for the window ending at t' is at W-1-(t'-t).
        let mut scores = WindowedScores::zeros(1, 3, 1, 2);
        let v = scores.values_mut();
        v[[0, 1, 0, 1]] = 4.0; // t=1 seen from t'=1
        v[[0, 2, 0, 0]] = 2.0; // t=1 seen from t'=2
        v[[0, 2, 0, 1]] = -6.0; // t=2 seen from t'=2

        let mean = scores.aggregate(Aggregation::Mean);
        assert_eq!(mean.values()[[0, 1, 0]], 3.0);
        assert_eq!(mean.values()[[0, 2, 0]], -6.0);

        let max = scores.aggregate(Aggregation::Max);
        assert_eq!(max.values()[[0, 1, 0]], 4.0);

        let absmax = scores.aggregate(Aggregation::AbsMax);
        assert_eq!(absmax.values()[[0, 2, 0]], -6.0);
        assert_eq!(absmax.dim(), (1, 3, 1));
    }

    #[test]
    fn test_combine_folds() {
        let a = ImportanceMap::new(Array3::from_elem((2, 3, 1), 1.0));
        let b = ImportanceMap::signed(Array3::from_elem((2, 3, 1), -3.0));
        let mean = ImportanceMap::combine(&[a.clone(), b.clone()], Aggregation::Mean).unwrap();
        assert_eq!(mean.values()[[1, 2, 0]], -1.0);
        assert!(mean.is_signed());
        assert_eq!(mean.ranking_scores()[[0, 0, 0]], 1.0);

        let other = ImportanceMap::new(Array3::zeros((1, 3, 1)));
        assert!(ImportanceMap::combine(&[a, other], Aggregation::Max).is_err());
        assert!(ImportanceMap::combine(&[], Aggregation::Max).is_err());
    }

    #[test]
    fn test_input_layout_is_transposed() {
        let x = Array3::from_shape_fn((1, 2, 3), |(_, v, t)| (v * 10 + t) as f32);
        let map = ImportanceMap::from_input_layout(x, false);
        assert_eq!(map.dim(), (1, 3, 2));
        assert_eq!(map.values()[[0, 2, 1]], 12.0);
    }

    #[test]
    fn test_map_must_cover_the_input_batch() {
        // input is (N=2, V=3, L=4); scores are (N, L, V)
        let input = TSShape::from((2, 3, 4));
        let map = ImportanceMap::new(Array3::zeros((2, 4, 3)));
        assert!(map.ensure_matches(input).is_ok());

        let transposed = ImportanceMap::new(Array3::zeros((2, 3, 4)));
        assert!(matches!(
            transposed.ensure_matches(input),
            Err(ExplainError::InvalidShape(_))
        ));
        assert!(map.ensure_matches(TSShape::new(1, 3, 4)).is_err());
    }

    #[test]
    fn test_npy_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("importance/winit_cv0.npy");
        let map = ImportanceMap::new(Array3::from_shape_fn((2, 4, 3), |(a, b, c)| (a + b * c) as f32));
        map.save(&path).unwrap();
        assert_eq!(ImportanceMap::load(&path, false).unwrap(), map);

        let raw = WindowedScores::zeros(2, 4, 3, 2);
        let raw_path = dir.path().join("raw.npy");
        raw.save(&raw_path).unwrap();
        assert_eq!(WindowedScores::load(&raw_path).unwrap().window(), 2);
    }
}
