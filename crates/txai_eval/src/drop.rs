//! Performance drop of a classifier under masking.
//!
//! Original and masked test series are scored at the last timestep; the
//! drop metrics compare the two.

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::masker::MaskOutcome;
use txai_explain::Predictor;
use txai_train::ClassificationSummary;

/// Metrics of one masker on one importance map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DropMetrics {
    /// AUROC on masked series.
    pub auc: Option<f64>,
    /// Original AUROC minus masked AUROC.
    pub auc_drop: Option<f64>,
    /// Accuracy on masked series.
    pub acc: f64,
    /// Original accuracy minus masked accuracy.
    pub acc_drop: f64,
    /// Cross-entropy on masked series.
    pub ce: f64,
    /// Masked cross-entropy minus original cross-entropy.
    pub ce_increase: f64,
    /// Mean total-variation distance between original and masked predictions.
    pub avg_pred_diff: f64,
    /// Mean number of masked cells per series.
    pub avg_masked_count: f64,
}

impl DropMetrics {
    /// `(column, value)` pairs in results-table order; missing values are NaN.
    pub fn columns(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("auc", self.auc.unwrap_or(f64::NAN)),
            ("auc_drop", self.auc_drop.unwrap_or(f64::NAN)),
            ("acc", self.acc),
            ("acc_drop", self.acc_drop),
            ("ce", self.ce),
            ("ce_increase", self.ce_increase),
            ("avg_pred_diff", self.avg_pred_diff),
            ("avg_masked_count", self.avg_masked_count),
        ]
    }
}

/// Original predictions on the test split, computed once per classifier.
#[derive(Debug, Clone)]
pub struct PerformanceDrop {
    labels: Vec<usize>,
    original: Array2<f32>,
    summary: ClassificationSummary,
}

impl PerformanceDrop {
    /// Score the unmasked test series.
    ///
    /// # Errors
    ///
    /// Propagates prediction and metric failures.
    pub fn new<P: Predictor + ?Sized>(
        predictor: &P,
        x: &Array3<f32>,
        labels: &[usize],
    ) -> Result<Self> {
        if labels.len() != x.dim().0 {
            return Err(EvalError::InvalidShape(format!(
                "{} series but {} labels",
                x.dim().0,
                labels.len()
            )));
        }
        let original = predictor.predict_proba(x)?;
        let summary = ClassificationSummary::compute(original.view(), labels)?;
        tracing::info!(
            auc = ?summary.auroc,
            acc = summary.accuracy,
            ce = summary.cross_entropy,
            "unmasked test performance"
        );
        Ok(Self {
            labels: labels.to_vec(),
            original,
            summary,
        })
    }

    /// Unmasked summary.
    pub fn baseline(&self) -> &ClassificationSummary {
        &self.summary
    }

    /// Score a masked version of the test series.
    ///
    /// # Errors
    ///
    /// Propagates prediction and metric failures.
    pub fn evaluate<P: Predictor + ?Sized>(
        &self,
        predictor: &P,
        outcome: &MaskOutcome,
    ) -> Result<DropMetrics> {
        let masked = predictor.predict_proba(&outcome.x)?;
        if masked.dim() != self.original.dim() {
            return Err(EvalError::InvalidShape(format!(
                "masked predictions {:?} != original {:?}",
                masked.dim(),
                self.original.dim()
            )));
        }
        let summary = ClassificationSummary::compute(masked.view(), &self.labels)?;

        let n = masked.nrows().max(1) as f64;
        let avg_pred_diff = self
            .original
            .outer_iter()
            .zip(masked.outer_iter())
            .map(|(p, q)| {
                0.5 * p
                    .iter()
                    .zip(q.iter())
                    .map(|(a, b)| f64::from((a - b).abs()))
                    .sum::<f64>()
            })
            .sum::<f64>()
            / n;

        Ok(DropMetrics {
            auc: summary.auroc,
            auc_drop: self.summary.auroc.zip(summary.auroc).map(|(o, m)| o - m),
            acc: summary.accuracy,
            acc_drop: self.summary.accuracy - summary.accuracy,
            ce: summary.cross_entropy,
            ce_increase: summary.cross_entropy - self.summary.cross_entropy,
            avg_pred_diff,
            avg_masked_count: outcome.avg_masked_count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masker::{Direction, MaskMethod, Masker, MaskerConfig, TopK};
    use txai_explain::{ExplainError, ImportanceMap};

    /// Class 1 when the last value of feature 0 is positive.
    fn predictor(x: &Array3<f32>) -> std::result::Result<Array2<f32>, ExplainError> {
        let (n, _, len) = x.dim();
        Ok(Array2::from_shape_fn((n, 2), |(i, c)| {
            let p1 = 1.0 / (1.0 + (-4.0 * x[[i, 0, len - 1]]).exp());
            if c == 1 {
                p1
            } else {
                1.0 - p1
            }
        }))
    }

    fn data() -> (Array3<f32>, Vec<usize>) {
        let x = Array3::from_shape_fn((6, 2, 5), |(i, f, t)| {
            let sign = if i % 2 == 0 { -1.0 } else { 1.0 };
            if f == 0 && t >= 3 {
                sign
            } else {
                0.1 * t as f32
            }
        });
        let labels = (0..6).map(|i| i % 2).collect();
        (x, labels)
    }

    #[test]
    fn test_masking_informative_cells_hurts_more() {
        let (x, labels) = data();
        let drop = PerformanceDrop::new(&predictor, &x, &labels).unwrap();
        assert_eq!(drop.baseline().accuracy, 1.0);

        // importance (N, L, V): feature 0 from t=3 on is what matters
        let informative = ImportanceMap::new(Array3::from_shape_fn((6, 5, 2), |(_, t, f)| {
            if f == 0 && t == 3 { 1.0 } else { 0.0 }
        }));
        let uninformative = ImportanceMap::new(Array3::from_shape_fn((6, 5, 2), |(_, t, f)| {
            if f == 1 && t == 1 { 1.0 } else { 0.0 }
        }));
        let masker = Masker::new(MaskerConfig::new(MaskMethod::End, TopK::Count(1))).unwrap();

        let top = drop
            .evaluate(&predictor, &masker.mask(&x, &informative).unwrap())
            .unwrap();
        let bottom = drop
            .evaluate(&predictor, &masker.mask(&x, &uninformative).unwrap())
            .unwrap();
        assert!(top.avg_pred_diff >= bottom.avg_pred_diff);
        assert!(top.ce_increase > 0.0);
        assert_eq!(bottom.acc_drop, 0.0);
        assert_eq!(top.avg_masked_count, 2.0);
        assert_eq!(top.columns().len(), 8);
    }

    #[test]
    fn test_top_ranked_cell_hurts_more_than_bottom_ranked() {
        let (x, labels) = data();
        let drop = PerformanceDrop::new(&predictor, &x, &labels).unwrap();

        // One map, distinct scores: feature 0 at the last step ranks first,
        // feature 1 at t=0 ranks last.
        let importance = ImportanceMap::new(Array3::from_shape_fn((6, 5, 2), |(_, t, f)| {
            if f == 0 { 10.0 + t as f32 } else { t as f32 }
        }));
        let top = Masker::new(MaskerConfig::new(MaskMethod::Zero, TopK::Count(1))).unwrap();
        let bottom = Masker::new(
            MaskerConfig::new(MaskMethod::Zero, TopK::Count(1)).with_direction(Direction::Bottom),
        )
        .unwrap();

        let top_outcome = top.mask(&x, &importance).unwrap();
        let bottom_outcome = bottom.mask(&x, &importance).unwrap();
        assert_eq!(top_outcome.all_masked_count()[[0, 4]], 6);
        assert_eq!(bottom_outcome.all_masked_count()[[1, 0]], 6);

        let top = drop.evaluate(&predictor, &top_outcome).unwrap();
        let bottom = drop.evaluate(&predictor, &bottom_outcome).unwrap();
        assert!(top.avg_pred_diff >= bottom.avg_pred_diff);
        assert!(top.avg_pred_diff > 0.0);
        assert_eq!(bottom.avg_pred_diff, 0.0);
        assert_eq!(top.avg_masked_count, 1.0);
        assert_eq!(bottom.avg_masked_count, 1.0);
    }

    #[test]
    fn test_label_count_mismatch() {
        let (x, _) = data();
        assert!(PerformanceDrop::new(&predictor, &x, &[0, 1]).is_err());
    }
}
