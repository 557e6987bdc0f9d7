//! Cross-validation fold splitting.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};
use txai_core::Seed;

/// Indices of the training and validation parts of one fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSplit {
    /// Indices used for fitting.
    pub train: Vec<usize>,
    /// Indices held out for validation.
    pub valid: Vec<usize>,
}

/// Split `n` samples into the training and validation parts of fold `cv`.
///
/// The samples are shuffled once with `seed`, then cut into
/// `round(1 / (1 - train_ratio))` contiguous blocks. Fold `cv` validates on
/// block `cv % n_folds` and trains on the rest, so the validation parts of
/// all folds partition the data.
///
/// # Errors
///
/// Returns [`DataError::SplitError`] if `train_ratio` is outside `(0, 1)` or
/// there are too few samples for a non-empty validation block.
///
/// # Example
///
/// ```rust
/// use txai_core::Seed;
/// use txai_data::cv_split;
///
/// let fold = cv_split(100, 0, 0.8, Seed::new(1)).unwrap();
/// assert_eq!(fold.valid.len(), 20);
/// assert_eq!(fold.train.len(), 80);
/// ```
pub fn cv_split(n: usize, cv: usize, train_ratio: f32, seed: Seed) -> Result<FoldSplit> {
    if !(train_ratio > 0.0 && train_ratio < 1.0) {
        return Err(DataError::SplitError(format!(
            "train_ratio must be in (0, 1), got {train_ratio}"
        )));
    }
    let n_folds = ((1.0 / (1.0 - train_ratio)).round() as usize).max(2);
    if n < n_folds {
        return Err(DataError::SplitError(format!(
            "{n} samples cannot be split into {n_folds} folds"
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut seed.to_rng());

    let fold = cv % n_folds;
    let start = fold * n / n_folds;
    let end = (fold + 1) * n / n_folds;

    let mut valid = order[start..end].to_vec();
    let mut train: Vec<usize> = order[..start].iter().chain(&order[end..]).copied().collect();
    valid.sort_unstable();
    train.sort_unstable();

    tracing::debug!(cv, n_folds, n_train = train.len(), n_valid = valid.len(), "fold split");
    Ok(FoldSplit { train, valid })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_fold_sizes() {
        let fold = cv_split(103, 2, 0.8, Seed::new(3)).unwrap();
        assert_eq!(fold.train.len() + fold.valid.len(), 103);
        assert!((20..=21).contains(&fold.valid.len()));
    }

    #[test]
    fn test_validation_blocks_partition_data() {
        let mut seen = HashSet::new();
        for cv in 0..5 {
            let fold = cv_split(50, cv, 0.8, Seed::new(9)).unwrap();
            let train: HashSet<_> = fold.train.iter().collect();
            assert!(fold.valid.iter().all(|i| !train.contains(i)));
            for i in fold.valid {
                assert!(seen.insert(i), "index {i} validated twice");
            }
        }
        assert_eq!(seen.len(), 50);
    }

    #[test]
    fn test_same_seed_same_split() {
        let a = cv_split(40, 1, 0.75, Seed::new(5)).unwrap();
        let b = cv_split(40, 1, 0.75, Seed::new(5)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_ratio() {
        assert!(cv_split(10, 0, 1.0, Seed::new(0)).is_err());
        assert!(cv_split(10, 0, 0.0, Seed::new(0)).is_err());
        assert!(cv_split(3, 0, 0.8, Seed::new(0)).is_err());
    }
}
