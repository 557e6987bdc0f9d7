//! Classification and ranking metrics on host arrays.
//!
//! Predictions are probabilities `(N, C)` after softmax and labels are class
//! indices. Ranking metrics take one score per item and a binary label.

use ndarray::{Array2, ArrayView2};

use crate::error::{Result, TrainError};

/// Clamp applied to probabilities inside logarithms.
pub const PROB_EPS: f64 = 1e-7;

fn check_rows(probs: &ArrayView2<'_, f32>, labels: &[usize]) -> Result<()> {
    if probs.nrows() != labels.len() {
        return Err(TrainError::MetricError(format!(
            "{} predictions but {} labels",
            probs.nrows(),
            labels.len()
        )));
    }
    if let Some(bad) = labels.iter().find(|&&l| l >= probs.ncols()) {
        return Err(TrainError::MetricError(format!(
            "label {bad} out of range for {} classes",
            probs.ncols()
        )));
    }
    Ok(())
}

/// Area under the ROC curve of binary scores.
///
/// Uses the Wilcoxon-Mann-Whitney statistic with tied scores sharing their
/// average rank. Returns `None` when only one class is present.
///
/// ```rust
/// use txai_train::metrics::auroc;
///
/// let auc = auroc(&[0.1, 0.4, 0.35, 0.8], &[false, false, true, true]).unwrap();
/// assert!((auc - 0.75).abs() < 1e-12);
/// ```
#[must_use]
pub fn auroc(scores: &[f32], labels: &[bool]) -> Option<f64> {
    let n = scores.len().min(labels.len());
    let n_pos = labels[..n].iter().filter(|&&l| l).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum = 0.0f64;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j < n && scores[order[j]] == scores[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j share their mean.
        let avg_rank = (i + j + 1) as f64 / 2.0;
        rank_sum += avg_rank * order[i..j].iter().filter(|&&k| labels[k]).count() as f64;
        i = j;
    }

    let n_pos = n_pos as f64;
    Some((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}

/// Average precision of binary scores.
///
/// Items are swept in descending score order; tied scores enter together.
/// Returns `None` without positives.
#[must_use]
pub fn auprc(scores: &[f32], labels: &[bool]) -> Option<f64> {
    let n = scores.len().min(labels.len());
    let n_pos = labels[..n].iter().filter(|&&l| l).count();
    if n_pos == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let (mut tp, mut seen) = (0usize, 0usize);
    let mut prev_recall = 0.0f64;
    let mut ap = 0.0f64;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j < n && scores[order[j]] == scores[order[i]] {
            tp += usize::from(labels[order[j]]);
            j += 1;
        }
        seen += j - i;
        let recall = tp as f64 / n_pos as f64;
        let precision = tp as f64 / seen as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
        i = j;
    }
    Some(ap)
}

/// ROC AUC of class probabilities.
///
/// Two classes use the positive-class column; more classes use the macro
/// one-vs-rest mean over classes that have both positives and negatives.
///
/// # Errors
///
/// Returns [`TrainError::MetricError`] when shapes or labels do not match.
pub fn auroc_multiclass(probs: ArrayView2<'_, f32>, labels: &[usize]) -> Result<Option<f64>> {
    check_rows(&probs, labels)?;
    let n_classes = probs.ncols();
    if n_classes == 2 {
        let scores = probs.column(1).to_vec();
        let positives: Vec<bool> = labels.iter().map(|&l| l == 1).collect();
        return Ok(auroc(&scores, &positives));
    }

    let per_class: Vec<f64> = (0..n_classes)
        .filter_map(|c| {
            let scores = probs.column(c).to_vec();
            let positives: Vec<bool> = labels.iter().map(|&l| l == c).collect();
            auroc(&scores, &positives)
        })
        .collect();
    if per_class.is_empty() {
        return Ok(None);
    }
    Ok(Some(per_class.iter().sum::<f64>() / per_class.len() as f64))
}

/// Share of rows whose arg-max equals the label.
///
/// # Errors
///
/// Returns [`TrainError::MetricError`] when shapes or labels do not match.
pub fn accuracy(probs: ArrayView2<'_, f32>, labels: &[usize]) -> Result<f64> {
    check_rows(&probs, labels)?;
    if labels.is_empty() {
        return Ok(0.0);
    }
    let correct = probs
        .rows()
        .into_iter()
        .zip(labels)
        .filter(|(row, label)| argmax(row.iter().copied()) == **label)
        .count();
    Ok(correct as f64 / labels.len() as f64)
}

/// Mean negative log likelihood of the labels.
///
/// # Errors
///
/// Returns [`TrainError::MetricError`] when shapes or labels do not match.
pub fn cross_entropy(probs: ArrayView2<'_, f32>, labels: &[usize]) -> Result<f64> {
    check_rows(&probs, labels)?;
    if labels.is_empty() {
        return Ok(0.0);
    }
    let total: f64 = labels
        .iter()
        .enumerate()
        .map(|(i, &l)| -(f64::from(probs[[i, l]]).max(PROB_EPS)).ln())
        .sum();
    Ok(total / labels.len() as f64)
}

/// Index of the largest value; the first one wins ties.
pub fn argmax(values: impl IntoIterator<Item = f32>) -> usize {
    let mut best = (0, f32::NEG_INFINITY);
    for (i, v) in values.into_iter().enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best.0
}

/// Row-wise softmax of logits.
#[must_use]
pub fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum: f32 = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

/// Last-step summary of a classifier on one split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationSummary {
    /// ROC AUC, `None` when a class is missing.
    pub auroc: Option<f64>,
    /// Accuracy.
    pub accuracy: f64,
    /// Cross-entropy.
    pub cross_entropy: f64,
}

impl ClassificationSummary {
    /// Compute every metric at once.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::MetricError`] when shapes or labels do not match.
    pub fn compute(probs: ArrayView2<'_, f32>, labels: &[usize]) -> Result<Self> {
        Ok(Self {
            auroc: auroc_multiclass(probs, labels)?,
            accuracy: accuracy(probs, labels)?,
            cross_entropy: cross_entropy(probs, labels)?,
        })
    }
}
