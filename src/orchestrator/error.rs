//! Terminal failures of a query.

use std::fmt;

use thiserror::Error;

use crate::collaborators::{EmbeddingError, GenerationError, RetrievalError};

use super::attempt::AttemptRecord;

/// Machine-readable kind of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EmbeddingError,
    RetrievalError,
    GenerationError,
    ValidationExhausted,
    Cancelled,
}

impl ErrorKind {
    /// Returns the kind name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmbeddingError => "EmbeddingError",
            Self::RetrievalError => "RetrievalError",
            Self::GenerationError => "GenerationError",
            Self::ValidationExhausted => "ValidationExhausted",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a query ended without an answer.
///
/// Upstream failures are surfaced as soon as they happen; validation failures
/// only surface as [`PipelineError::ValidationExhausted`] once the attempt
/// budget is spent, carrying every attempt for diagnosis.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The query vectorizer failed or timed out
    #[error("EmbeddingError: {0}")]
    Embedding(#[from] EmbeddingError),

    /// The chunk retriever failed or timed out
    #[error("RetrievalError: {0}")]
    Retrieval(#[from] RetrievalError),

    /// The response generator failed, timed out or was rate limited
    #[error("GenerationError: {0}")]
    Generation(#[from] GenerationError),

    /// Every attempt produced output that failed validation
    #[error(
        "ValidationExhausted: no valid answer after {} attempts (last: {})",
        .attempts.len(),
        last_failure(.attempts)
    )]
    ValidationExhausted { attempts: Vec<AttemptRecord> },

    /// The caller cancelled the query
    #[error("Cancelled: the query was cancelled before it completed")]
    Cancelled,
}

fn last_failure(attempts: &[AttemptRecord]) -> String {
    attempts
        .last()
        .and_then(AttemptRecord::failure)
        .map(ToString::to_string)
        .unwrap_or_else(|| "no attempts recorded".to_string())
}

impl PipelineError {
    /// Returns the machine-readable kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Embedding(_) => ErrorKind::EmbeddingError,
            Self::Retrieval(_) => ErrorKind::RetrievalError,
            Self::Generation(_) => ErrorKind::GenerationError,
            Self::ValidationExhausted { .. } => ErrorKind::ValidationExhausted,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Returns the attempt history; empty unless validation was exhausted.
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            Self::ValidationExhausted { attempts } => attempts,
            _ => &[],
        }
    }
}
