use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by ports and pure engines.
///
/// `Clone` so a single deduplicated fetch can hand the same error to every
/// waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AnalysisError {
    /// Classify the error for callers that report degraded output.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AnalysisError::CacheError(_) | AnalysisError::Serialization(_) => {
                FailureKind::CacheUnavailable
            }
            AnalysisError::InsufficientData(_) | AnalysisError::InvalidData(_) => {
                FailureKind::DataInsufficient
            }
            AnalysisError::Cancelled => FailureKind::Cancelled,
            AnalysisError::ApiError(_) | AnalysisError::Unknown(_) => {
                FailureKind::UpstreamUnavailable
            }
        }
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(e: serde_json::Error) -> Self {
        AnalysisError::Serialization(e.to_string())
    }
}

/// Failure taxonomy. Every kind degrades some output fields to absent; none
/// aborts a whole pipeline run except `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UpstreamUnavailable,
    CacheUnavailable,
    DataInsufficient,
    Cancelled,
}
