//! Data split identifiers.

use serde::{Deserialize, Serialize};

/// Which part of a dataset a loader or array belongs to.
///
/// ```rust
/// use txai_core::Split;
///
/// assert!(Split::Train.is_train());
/// assert_eq!(Split::Test.file_stem(), "test");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Fitting split.
    #[default]
    Train,
    /// Held out of fitting, used for model selection and early stopping.
    Valid,
    /// Split on which explanations are computed and evaluated.
    Test,
}

impl Split {
    /// True for the training split.
    #[must_use]
    pub const fn is_train(&self) -> bool {
        matches!(self, Split::Train)
    }

    /// True for validation or test.
    #[must_use]
    pub const fn is_eval(&self) -> bool {
        matches!(self, Split::Valid | Split::Test)
    }

    /// Stem used for files holding this split on disk.
    #[must_use]
    pub const fn file_stem(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test => "test",
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_stem())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_checks() {
        assert!(Split::Train.is_train());
        assert!(!Split::Train.is_eval());
        assert!(Split::Valid.is_eval());
        assert!(Split::Test.is_eval());
    }

    #[test]
    fn test_split_display() {
        assert_eq!(Split::Valid.to_string(), "valid");
        let parsed: Split = serde_json::from_str("\"test\"").unwrap();
        assert_eq!(parsed, Split::Test);
    }
}
