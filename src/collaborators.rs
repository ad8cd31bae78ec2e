//! Capability interfaces for the external services the pipeline depends on.
//!
//! Each trait has exactly one method so that tests can inject deterministic
//! fakes and deployments can swap providers without touching the orchestrator.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::composer::RenderedPrompt;
use crate::models::RetrievedChunk;

/// Errors raised by a [`QueryVectorizer`].
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The embedding call did not finish within its time budget
    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),

    /// The service rejected the input text
    #[error("embedding input rejected: {0}")]
    InvalidInput(String),

    /// Any other service or transport failure
    #[error("embedding service failed: {0}")]
    Service(String),
}

/// Errors raised by a [`ChunkRetriever`].
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The search call did not finish within its time budget
    #[error("retrieval request timed out after {0:?}")]
    Timeout(Duration),

    /// Any other service or transport failure
    #[error("retrieval service failed: {0}")]
    Service(String),
}

/// Sub-kinds of [`GenerationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    Timeout,
    RateLimited,
    Other,
}

impl GenerationErrorKind {
    /// Machine-readable name of the sub-kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "Timeout",
            Self::RateLimited => "RateLimited",
            Self::Other => "Other",
        }
    }
}

impl std::fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a [`ResponseGenerator`].
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The generation call did not finish within its time budget
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    /// The provider throttled the request
    #[error("generation rate limited{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// Any other provider or transport failure
    #[error("generation failed: {0}")]
    Other(String),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(delay) => format!(" (retry after {}s)", delay.as_secs()),
        None => String::new(),
    }
}

impl GenerationError {
    /// Returns the sub-kind of this error.
    pub fn kind(&self) -> GenerationErrorKind {
        match self {
            Self::Timeout(_) => GenerationErrorKind::Timeout,
            Self::RateLimited { .. } => GenerationErrorKind::RateLimited,
            Self::Other(_) => GenerationErrorKind::Other,
        }
    }
}

/// Turns query text into a fixed-length embedding vector.
#[async_trait]
pub trait QueryVectorizer: Send + Sync {
    /// Embeds `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Finds the stored chunks most similar to a query vector.
#[async_trait]
pub trait ChunkRetriever: Send + Sync {
    /// Returns at most `top_k` chunks, most relevant first.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError>;
}

/// Produces raw text from a rendered prompt.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Generates a completion for `prompt`.
    async fn generate(&self, prompt: &RenderedPrompt) -> Result<String, GenerationError>;
}
