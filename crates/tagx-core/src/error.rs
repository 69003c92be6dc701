use serde::Serialize;
use thiserror::Error;

pub type TagxResult<T> = Result<T, TagxError>;

#[derive(Debug, Error)]
pub enum TagxError {
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why a tag attempt was surfaced as a failure.
///
/// Only `MarkerNotRecognized` and `AnalyzerInputEmpty` are raised before any
/// hypothesis is tried. `StructuralCheckFailed` is internal to the search and
/// only reaches the caller when the run exhausts with a candidate that scored
/// above threshold but broke a hard check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    #[error("marker not recognized: {reason}")]
    MarkerNotRecognized { reason: String },

    #[error("key space exhausted after {attempts} attempts")]
    KeyExhausted {
        attempts: usize,
        budget_exhausted: bool,
    },

    #[error("structural check failed ({check}) after {attempts} attempts")]
    StructuralCheckFailed { check: String, attempts: usize },

    #[error("analyzer input is empty")]
    AnalyzerInputEmpty,
}

impl FailureKind {
    /// Failures that are reported without running the search at all.
    pub fn is_immediate(&self) -> bool {
        matches!(
            self,
            FailureKind::MarkerNotRecognized { .. } | FailureKind::AnalyzerInputEmpty
        )
    }
}
