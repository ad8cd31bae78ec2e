//! Query orchestration.
//!
//! The `Orchestrator` drives one query through retrieval, prompt composition,
//! generation and validation, looping back with a repair directive when the
//! generated output is rejected, up to the configured attempt budget.

mod attempt;
mod cancel;
mod error;
mod pipeline;

pub use attempt::{AttemptOutcome, AttemptRecord};
pub use cancel::CancellationToken;
pub use error::{ErrorKind, PipelineError};
pub use pipeline::{AnsweredQuery, Orchestrator, OrchestratorBuilder, repair_directive};
