//! Error types for scorelayout.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoreError {
    /// A user-supplied value (note name, rhythm, tuning, ...) was rejected.
    #[error("invalid {kind}: {value:?}")]
    InvalidValue { kind: &'static str, value: String },

    #[error("arc starting in measure {measure} has no right anchor and no terminator")]
    ArcWithoutEndpoint { measure: usize },

    #[error("arc from measure {from} to measure {to} spans more than one row break")]
    ArcSpansTooManyRows { from: usize, to: usize },

    #[error("no current row to append a measure to")]
    NoCurrentRow,

    #[error("layout group cycle through {0:?}")]
    LayoutGroupCycle(String),

    #[error("layout group member {0:?} is neither a staff nor a group")]
    UnknownGroupMember(String),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl ScoreError {
    pub(crate) fn invalid(kind: &'static str, value: impl Into<String>) -> Self {
        ScoreError::InvalidValue { kind, value: value.into() }
    }
}

pub type Result<T> = std::result::Result<T, ScoreError>;
