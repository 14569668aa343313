use thiserror::Error;

/// Contract violations detected by the tree search.
///
/// Every variant is a caller bug rather than a recoverable runtime
/// condition; the search refuses to proceed instead of corrupting the
/// visit-count accounting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MctsError {
    #[error("batch size mismatch for {what}: expected {expected}, got {actual}")]
    BatchSizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("root {root} has no legal actions")]
    NoLegalActions { root: usize },

    #[error("select_child called on a node without children")]
    SelectOnLeaf,

    #[error("node in tree {root} is already expanded")]
    AlreadyExpanded { root: usize },

    #[error("root {root} has not been prepared")]
    RootNotExpanded { root: usize },

    #[error("legal action {action} is out of range for policy of length {len}")]
    PolicyTooShort { action: u16, len: usize },

    #[error("empty policy for a leaf of tree {root}")]
    EmptyPolicy { root: usize },

    #[error("{len} actions exceed the supported maximum of {}", u16::MAX)]
    TooManyActions { len: usize },

    #[error("UCB score for action {action} is not finite")]
    NonFiniteScore { action: u16 },

    #[error("search results do not belong to the current roots")]
    StaleSearchResults,

    #[error("model evaluation failed: {0}")]
    Model(String),

    #[error("invalid search configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience Result type for tree search operations
pub type Result<T> = std::result::Result<T, MctsError>;

/// Fail with [`MctsError::BatchSizeMismatch`] unless `actual == expected`.
#[inline]
pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(MctsError::BatchSizeMismatch {
            what,
            expected,
            actual,
        })
    }
}
