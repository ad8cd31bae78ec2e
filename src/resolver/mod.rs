//! Parsing and validation of generated output.
//!
//! The `StructuredOutputResolver` extracts the first well-formed JSON object
//! from a raw generation, checks it against the fixed answer schema, and
//! verifies that every cited chunk was actually shown to the model.

mod extract;
mod structured_output_resolver;
mod types;

pub use extract::{ParseOutcome, parse_structured};
pub use structured_output_resolver::StructuredOutputResolver;
pub use types::{FailureKind, FailureReason, ValidationFailure};
