//! Per-attempt bookkeeping.

use crate::composer::PromptContext;
use crate::models::RawGeneration;
use crate::resolver::ValidationFailure;

/// Validation outcome of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Accepted,
    Rejected(ValidationFailure),
}

/// What happened during one compose/generate/validate cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    raw: RawGeneration,
    repair_directive: Option<String>,
    included_chunks: usize,
    outcome: AttemptOutcome,
}

impl AttemptRecord {
    pub(crate) fn new(raw: RawGeneration, context: &PromptContext, outcome: AttemptOutcome) -> Self {
        Self {
            raw,
            repair_directive: context.repair_directive().map(str::to_string),
            included_chunks: context.chunks().len(),
            outcome,
        }
    }

    /// Returns the 1-based attempt number.
    pub fn index(&self) -> u32 {
        self.raw.attempt()
    }

    /// Returns the generator output for this attempt.
    pub fn raw(&self) -> &RawGeneration {
        &self.raw
    }

    /// Returns the repair directive the attempt's prompt was composed with.
    pub fn repair_directive(&self) -> Option<&str> {
        self.repair_directive.as_deref()
    }

    /// Returns how many chunks the attempt's prompt included.
    pub fn included_chunks(&self) -> usize {
        self.included_chunks
    }

    /// Returns the validation outcome.
    pub fn outcome(&self) -> &AttemptOutcome {
        &self.outcome
    }

    /// Returns the validation failure, if the attempt was rejected.
    pub fn failure(&self) -> Option<&ValidationFailure> {
        match &self.outcome {
            AttemptOutcome::Accepted => None,
            AttemptOutcome::Rejected(failure) => Some(failure),
        }
    }

    /// Returns true if the attempt produced the final answer.
    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Accepted)
    }
}
