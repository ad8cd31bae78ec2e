//! Structured prompt construction.
//!
//! This module provides the `PromptComposer`, which renders the query and the
//! retrieved chunks into a tagged prompt carrying the role, security,
//! deliberation and output-format directives, plus an optional repair section
//! on retry attempts.

mod prompt_composer;
mod types;

pub use prompt_composer::{
    DELIBERATION_DIRECTIVE, EMPTY_CONTEXT_DIRECTIVE, NOT_FOUND_ANSWER, OUTPUT_FORMAT_DIRECTIVE,
    PromptComposer, ROLE_DIRECTIVE, SECURITY_DIRECTIVE,
};
pub use types::{PromptContext, RenderedPrompt};
