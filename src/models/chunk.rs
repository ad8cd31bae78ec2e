use std::collections::BTreeMap;

use serde::Serialize;

use super::{ChunkId, DocumentId};

/// Arbitrary chunk metadata, kept ordered so prompt rendering is deterministic.
pub type ChunkMetadata = BTreeMap<String, serde_json::Value>;

/// A stored text chunk returned by the retriever for one query.
///
/// Built only through [`RetrievedChunk::new`], which clamps the score:
///
/// ```compile_fail
/// let _: ragline::RetrievedChunk = serde_json::from_str(
///     r#"{"id": "c1", "source": "d1", "content": "text", "score": 7.5, "metadata": {}}"#,
/// ).unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    id: ChunkId,
    source: DocumentId,
    content: String,
    score: f64,
    metadata: ChunkMetadata,
}

impl RetrievedChunk {
    /// Creates a chunk with empty metadata.
    ///
    /// The relevance score is clamped to 0.0-1.0; a NaN score becomes 0.0.
    pub fn new(
        id: impl Into<ChunkId>,
        source: DocumentId,
        content: impl Into<String>,
        score: f64,
    ) -> Self {
        let score = if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        };
        Self {
            id: id.into(),
            source,
            content: content.into(),
            score,
            metadata: ChunkMetadata::new(),
        }
    }

    /// Replaces the metadata mapping.
    #[must_use]
    pub fn with_metadata(mut self, metadata: ChunkMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns the chunk ID.
    pub fn id(&self) -> &ChunkId {
        &self.id
    }

    /// Returns the source document ID.
    pub fn source(&self) -> &DocumentId {
        &self.source
    }

    /// Returns the text content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the relevance score (0.0-1.0).
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Returns the metadata mapping.
    pub fn metadata(&self) -> &ChunkMetadata {
        &self.metadata
    }
}
