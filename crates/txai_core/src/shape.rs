//! Time series shape metadata.

use serde::{Deserialize, Serialize};

/// Shape of a batch of series in `(B, V, L)` order.
///
/// ```rust
/// use txai_core::TSShape;
///
/// let shape = TSShape::new(32, 3, 50);
/// assert_eq!(shape.importance_dims(), (32, 50, 3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TSShape {
    batch: usize,
    vars: usize,
    len: usize,
}

impl TSShape {
    /// Create a shape from batch size, variable count and sequence length.
    #[must_use]
    pub const fn new(batch: usize, vars: usize, len: usize) -> Self {
        Self { batch, vars, len }
    }

    /// Batch size.
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.batch
    }

    /// Number of variables.
    #[must_use]
    pub const fn vars(&self) -> usize {
        self.vars
    }

    /// Sequence length.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True if any dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.batch == 0 || self.vars == 0 || self.len == 0
    }

    /// Dimensions of the matching importance array, `(N, L, V)`.
    #[must_use]
    pub const fn importance_dims(&self) -> (usize, usize, usize) {
        (self.batch, self.len, self.vars)
    }
}

impl std::fmt::Display for TSShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(B={}, V={}, L={})", self.batch, self.vars, self.len)
    }
}

impl From<[usize; 3]> for TSShape {
    fn from([batch, vars, len]: [usize; 3]) -> Self {
        Self::new(batch, vars, len)
    }
}

/// From an ndarray `(N, V, L)` dimension tuple.
impl From<(usize, usize, usize)> for TSShape {
    fn from((batch, vars, len): (usize, usize, usize)) -> Self {
        Self::new(batch, vars, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_importance_dims_swap_vars_and_len() {
        let shape = TSShape::from((4, 3, 50));
        assert_eq!(shape.importance_dims(), (4, 50, 3));
        assert_eq!(shape, TSShape::from([4, 3, 50]));
        assert!(TSShape::new(0, 3, 50).is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(TSShape::new(2, 3, 4).to_string(), "(B=2, V=3, L=4)");
    }
}
