//! Scoring importance against known saliency.
//!
//! Synthetic datasets ship a binary `(N, V, L)` array marking the
//! observations that drive the label. The importance ranking is scored
//! against it with AUROC and AUPRC, skipping the first timestep.

use ndarray::{s, Array3};
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use txai_core::TSShape;
use txai_explain::{Aggregation, Explanation, ImportanceMap};
use txai_train::{auprc, auroc};

/// Ground-truth scores of one aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthMetrics {
    /// Aggregation of windowed scores.
    pub aggregation: Aggregation,
    /// AUROC of the ranking, `None` without both classes.
    pub auroc: Option<f64>,
    /// Average precision of the ranking.
    pub auprc: Option<f64>,
}

/// AUROC and AUPRC of `importance (N, L, V)` against `ground_truth (N, V, L)`.
///
/// # Errors
///
/// Returns [`EvalError::InvalidShape`] when the arrays disagree.
pub fn score_against_ground_truth(
    importance: &ImportanceMap,
    ground_truth: &Array3<f32>,
) -> Result<(Option<f64>, Option<f64>)> {
    let (n, n_vars, seq_len) = ground_truth.dim();
    importance
        .ensure_matches(TSShape::from(ground_truth.dim()))
        .map_err(|e| EvalError::InvalidShape(e.to_string()))?;

    let scores = importance.ranking_scores();
    let mut flat_scores = Vec::with_capacity(n * n_vars * seq_len.saturating_sub(1));
    let mut flat_labels = Vec::with_capacity(flat_scores.capacity());
    for ((i, t, f), &score) in scores.slice(s![.., 1.., ..]).indexed_iter() {
        flat_scores.push(score);
        flat_labels.push(ground_truth[[i, f, t + 1]] > 0.0);
    }
    Ok((auroc(&flat_scores, &flat_labels), auprc(&flat_scores, &flat_labels)))
}

/// Score an explanation under every aggregation method.
///
/// # Errors
///
/// See [`score_against_ground_truth`].
pub fn evaluate_ground_truth(
    explanation: &Explanation,
    ground_truth: &Array3<f32>,
) -> Result<Vec<GroundTruthMetrics>> {
    Aggregation::ALL
        .iter()
        .map(|&aggregation| {
            let (auroc, auprc) =
                score_against_ground_truth(&explanation.importance_for(aggregation), ground_truth)?;
            tracing::info!(
                explainer = %explanation.explainer,
                %aggregation,
                ?auroc,
                ?auprc,
                "ground-truth scores"
            );
            Ok(GroundTruthMetrics {
                aggregation,
                auroc,
                auprc,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn truth() -> Array3<f32> {
        // (N=2, V=2, L=4): feature 1 at t >= 2 is salient
        Array3::from_shape_fn((2, 2, 4), |(_, f, t)| if f == 1 && t >= 2 { 1.0 } else { 0.0 })
    }

    #[test]
    fn test_perfect_ranking() {
        let imp = ImportanceMap::new(Array3::from_shape_fn((2, 4, 2), |(_, t, f)| {
            if f == 1 && t >= 2 { 0.9 } else { 0.1 }
        }));
        let (auc, ap) = score_against_ground_truth(&imp, &truth()).unwrap();
        assert_eq!(auc, Some(1.0));
        assert!((ap.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_first_step_is_ignored() {
        // a huge score at t=0 on a non-salient cell would hurt if it counted
        let imp = ImportanceMap::new(Array3::from_shape_fn((2, 4, 2), |(_, t, f)| {
            if t == 0 { 100.0 } else if f == 1 && t >= 2 { 0.9 } else { 0.1 }
        }));
        let (auc, _) = score_against_ground_truth(&imp, &truth()).unwrap();
        assert_eq!(auc, Some(1.0));
    }

    #[test]
    fn test_signed_scores_rank_by_magnitude() {
        let imp = ImportanceMap::signed(Array3::from_shape_fn((2, 4, 2), |(_, t, f)| {
            if f == 1 && t >= 2 { -0.9 } else { 0.1 }
        }));
        let (auc, _) = score_against_ground_truth(&imp, &truth()).unwrap();
        assert_eq!(auc, Some(1.0));
    }

    #[test]
    fn test_every_aggregation_is_scored() {
        let explanation = Explanation {
            explainer: "fo".to_string(),
            importance: ImportanceMap::new(Array3::zeros((2, 4, 2))),
            windowed: None,
            origin: None,
        };
        let rows = evaluate_ground_truth(&explanation, &truth()).unwrap();
        assert_eq!(rows.len(), Aggregation::ALL.len());
        assert!(rows.iter().all(|r| r.auroc == Some(0.5)));
        assert!(score_against_ground_truth(&explanation.importance, &Array3::zeros((2, 4, 2))).is_err());
    }
}
