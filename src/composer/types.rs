//! Values produced by the prompt composer.

use std::fmt;

use crate::models::{ChunkId, Query, RetrievedChunk};

/// Everything one attempt's prompt was built from.
///
/// A new context is built for every attempt; it is never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext {
    query: Query,
    chunks: Vec<RetrievedChunk>,
    repair_directive: Option<String>,
}

impl PromptContext {
    pub(crate) fn new(
        query: Query,
        chunks: Vec<RetrievedChunk>,
        repair_directive: Option<String>,
    ) -> Self {
        Self {
            query,
            chunks,
            repair_directive,
        }
    }

    /// Returns the query the prompt answers.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Returns the chunks included in the prompt, most relevant first.
    pub fn chunks(&self) -> &[RetrievedChunk] {
        &self.chunks
    }

    /// Returns the repair directive, present only on retry attempts.
    pub fn repair_directive(&self) -> Option<&str> {
        self.repair_directive.as_deref()
    }

    /// Returns true if `id` names one of the included chunks.
    pub fn contains_chunk(&self, id: &ChunkId) -> bool {
        self.chunks.iter().any(|chunk| chunk.id() == id)
    }
}

/// The fully composed instruction text sent to the response generator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderedPrompt(String);

impl RenderedPrompt {
    pub(crate) fn new(text: String) -> Self {
        Self(text)
    }

    /// Returns the prompt text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the prompt contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.0.contains(needle)
    }
}

impl fmt::Display for RenderedPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RenderedPrompt {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
