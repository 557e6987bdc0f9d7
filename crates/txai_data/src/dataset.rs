//! Time series dataset types.

use ndarray::{concatenate, Array1, Array2, Array3, ArrayView2, Axis};

use crate::error::{DataError, Result};

/// A dataset of labelled time series.
///
/// Inputs are stored as `(N, V, L)`. Labels are class indices stored as
/// `(N, W)` floats: `W = 1` for one label per series, `W = L` for one label
/// per timestep. Synthetic datasets may also carry a binary `(N, V, L)`
/// ground-truth saliency map.
#[derive(Debug, Clone)]
pub struct TSDataset {
    x: Array3<f32>,
    y: Option<Array2<f32>>,
    ground_truth: Option<Array3<f32>>,
}

impl TSDataset {
    /// Create a dataset from inputs and optional labels.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidShape`] if the sample counts differ or the
    /// label width is neither 1 nor the sequence length, and
    /// [`DataError::InvalidLabel`] for negative or fractional labels.
    pub fn from_arrays(x: Array3<f32>, y: Option<Array2<f32>>) -> Result<Self> {
        let (n, _, l) = x.dim();
        if let Some(ref labels) = y {
            let (ny, w) = labels.dim();
            if ny != n {
                return Err(DataError::InvalidShape(format!(
                    "x has {n} samples but y has {ny} samples"
                )));
            }
            if w != 1 && w != l {
                return Err(DataError::InvalidShape(format!(
                    "label width {w} must be 1 or the sequence length {l}"
                )));
            }
            if let Some(bad) = labels.iter().find(|v| **v < 0.0 || v.fract() != 0.0) {
                return Err(DataError::InvalidLabel(*bad));
            }
        }
        Ok(Self {
            x,
            y,
            ground_truth: None,
        })
    }

    /// Attach a ground-truth saliency map of the same shape as `x`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidShape`] if the shapes differ.
    pub fn with_ground_truth(mut self, ground_truth: Array3<f32>) -> Result<Self> {
        if ground_truth.dim() != self.x.dim() {
            return Err(DataError::InvalidShape(format!(
                "ground truth {:?} does not match x {:?}",
                ground_truth.dim(),
                self.x.dim()
            )));
        }
        self.ground_truth = Some(ground_truth);
        Ok(self)
    }

    /// Number of series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len_of(Axis(0))
    }

    /// True when there are no series.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of variables.
    #[must_use]
    pub fn n_vars(&self) -> usize {
        self.x.len_of(Axis(1))
    }

    /// Sequence length.
    #[must_use]
    pub fn seq_len(&self) -> usize {
        self.x.len_of(Axis(2))
    }

    /// Shape as `(N, V, L)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize, usize) {
        self.x.dim()
    }

    /// Inputs.
    #[must_use]
    pub fn x(&self) -> &Array3<f32> {
        &self.x
    }

    /// Labels, if any.
    #[must_use]
    pub fn y(&self) -> Option<&Array2<f32>> {
        self.y.as_ref()
    }

    /// Ground-truth saliency, if any.
    #[must_use]
    pub fn ground_truth(&self) -> Option<&Array3<f32>> {
        self.ground_truth.as_ref()
    }

    /// True if labels are given for every timestep.
    #[must_use]
    pub fn labels_per_step(&self) -> bool {
        self.y
            .as_ref()
            .map_or(false, |y| y.ncols() == self.seq_len() && self.seq_len() > 1)
    }

    /// Number of classes, `max(label) + 1`, at least 2.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.y
            .as_ref()
            .and_then(|y| y.iter().copied().map(|v| v as usize).max())
            .map_or(2, |m| (m + 1).max(2))
    }

    /// Label of the last timestep of each series.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidShape`] if the dataset has no labels.
    pub fn last_step_labels(&self) -> Result<Array1<usize>> {
        let y = self
            .y
            .as_ref()
            .ok_or_else(|| DataError::InvalidShape("dataset has no labels".to_string()))?;
        let last = y.ncols() - 1;
        Ok(y.column(last).mapv(|v| v as usize))
    }

    /// Borrow one series and its labels.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::IndexOutOfBounds`] for an invalid index.
    pub fn get(&self, index: usize) -> Result<(ArrayView2<'_, f32>, Option<ndarray::ArrayView1<'_, f32>>)> {
        if index >= self.len() {
            return Err(DataError::IndexOutOfBounds {
                index,
                length: self.len(),
            });
        }
        let x = self.x.index_axis(Axis(0), index);
        let y = self.y.as_ref().map(|y| y.index_axis(Axis(0), index));
        Ok((x, y))
    }

    /// Copy the series at `indices` into a new dataset.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::IndexOutOfBounds`] for an invalid index.
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&index) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(DataError::IndexOutOfBounds {
                index,
                length: self.len(),
            });
        }
        Ok(Self {
            x: self.x.select(Axis(0), indices),
            y: self.y.as_ref().map(|y| y.select(Axis(0), indices)),
            ground_truth: self
                .ground_truth
                .as_ref()
                .map(|g| g.select(Axis(0), indices)),
        })
    }

    /// Append the series of `other`.
    ///
    /// Labels and ground truth are kept only if both sides have them.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidShape`] when variables or lengths differ.
    pub fn concat(&self, other: &Self) -> Result<Self> {
        if self.is_empty() {
            return Ok(other.clone());
        }
        if other.is_empty() {
            return Ok(self.clone());
        }
        let x = concatenate(Axis(0), &[self.x.view(), other.x.view()])
            .map_err(|e| DataError::InvalidShape(e.to_string()))?;
        let y = match (&self.y, &other.y) {
            (Some(a), Some(b)) => Some(
                concatenate(Axis(0), &[a.view(), b.view()])
                    .map_err(|e| DataError::InvalidShape(e.to_string()))?,
            ),
            _ => None,
        };
        let ground_truth = match (&self.ground_truth, &other.ground_truth) {
            (Some(a), Some(b)) => Some(
                concatenate(Axis(0), &[a.view(), b.view()])
                    .map_err(|e| DataError::InvalidShape(e.to_string()))?,
            ),
            _ => None,
        };
        Ok(Self { x, y, ground_truth })
    }
}

/// The train, validation and test parts of one cross-validation fold.
#[derive(Debug, Clone)]
pub struct TSDatasets {
    train: TSDataset,
    valid: TSDataset,
    test: TSDataset,
    cv: usize,
}

impl TSDatasets {
    /// Bundle the parts of fold `cv`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidShape`] if the parts disagree on variables
    /// or sequence length.
    pub fn new(train: TSDataset, valid: TSDataset, test: TSDataset, cv: usize) -> Result<Self> {
        for (name, part) in [("valid", &valid), ("test", &test)] {
            if !part.is_empty()
                && (part.n_vars() != train.n_vars() || part.seq_len() != train.seq_len())
            {
                return Err(DataError::InvalidShape(format!(
                    "{name} split {:?} does not match train split {:?}",
                    part.shape(),
                    train.shape()
                )));
            }
        }
        Ok(Self {
            train,
            valid,
            test,
            cv,
        })
    }

    /// Training part.
    #[must_use]
    pub fn train(&self) -> &TSDataset {
        &self.train
    }

    /// Validation part.
    #[must_use]
    pub fn valid(&self) -> &TSDataset {
        &self.valid
    }

    /// Test part.
    #[must_use]
    pub fn test(&self) -> &TSDataset {
        &self.test
    }

    /// Fold index.
    #[must_use]
    pub fn cv(&self) -> usize {
        self.cv
    }

    /// Number of variables.
    #[must_use]
    pub fn n_vars(&self) -> usize {
        self.train.n_vars()
    }

    /// Sequence length.
    #[must_use]
    pub fn seq_len(&self) -> usize {
        self.train.seq_len()
    }

    /// Number of classes across all parts.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.train
            .n_classes()
            .max(self.valid.n_classes())
            .max(self.test.n_classes())
    }
}
