use std::time::Duration;

use time::OffsetDateTime;

/// Unparsed text returned by the response generator for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RawGeneration {
    text: String,
    attempt: u32,
    started_at: OffsetDateTime,
    latency: Duration,
}

impl RawGeneration {
    /// Creates a raw generation record.
    ///
    /// `attempt` is 1-based.
    pub fn new(
        text: impl Into<String>,
        attempt: u32,
        started_at: OffsetDateTime,
        latency: Duration,
    ) -> Self {
        Self {
            text: text.into(),
            attempt,
            started_at,
            latency,
        }
    }

    /// Returns the generated text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns when the generation call was issued.
    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    /// Returns how long the generation call took.
    pub fn latency(&self) -> Duration {
        self.latency
    }
}
