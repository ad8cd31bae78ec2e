//! Validation failure types.

use std::fmt;

use thiserror::Error;

use crate::models::ChunkId;

/// Machine-readable kind of a [`FailureReason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    MalformedOutput,
    TypeMismatch,
    MissingField,
    UnexpectedField,
    HallucinatedCitation,
}

impl FailureKind {
    /// Returns the kind name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MalformedOutput => "MalformedOutput",
            Self::TypeMismatch => "TypeMismatch",
            Self::MissingField => "MissingField",
            Self::UnexpectedField => "UnexpectedField",
            Self::HallucinatedCitation => "HallucinatedCitation",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One specific reason a generation was rejected.
///
/// Displays as `Kind: detail`, e.g. `MissingField: answer`; this is the form
/// fed back to the model in repair directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No well-formed JSON object could be found
    MalformedOutput { detail: String },

    /// A field (or array element, e.g. `used_chunk_ids[1]`) has the wrong type
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A required field is absent
    MissingField { field: &'static str },

    /// A top-level field outside the schema is present
    UnexpectedField { field: String },

    /// A cited chunk id was not part of the prompt's context
    HallucinatedCitation { chunk_id: ChunkId },
}

impl FailureReason {
    /// Returns the machine-readable kind.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::MalformedOutput { .. } => FailureKind::MalformedOutput,
            Self::TypeMismatch { .. } => FailureKind::TypeMismatch,
            Self::MissingField { .. } => FailureKind::MissingField,
            Self::UnexpectedField { .. } => FailureKind::UnexpectedField,
            Self::HallucinatedCitation { .. } => FailureKind::HallucinatedCitation,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.kind())?;
        match self {
            Self::MalformedOutput { detail } => f.write_str(detail),
            Self::TypeMismatch {
                field,
                expected,
                found,
            } => write!(f, "{field} (expected {expected}, found {found})"),
            Self::MissingField { field } => f.write_str(field),
            Self::UnexpectedField { field } => f.write_str(field),
            Self::HallucinatedCitation { chunk_id } => {
                write!(f, "{chunk_id} is not one of the supplied chunks")
            }
        }
    }
}

/// All the reasons one generation failed validation.
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("generation failed validation: {}", summarize(.reasons))]
pub struct ValidationFailure {
    reasons: Vec<FailureReason>,
}

fn summarize(reasons: &[FailureReason]) -> String {
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationFailure {
    pub(crate) fn new(reasons: Vec<FailureReason>) -> Self {
        debug_assert!(!reasons.is_empty());
        Self { reasons }
    }

    pub(crate) fn single(reason: FailureReason) -> Self {
        Self::new(vec![reason])
    }

    /// Returns every reason, in report order.
    pub fn reasons(&self) -> &[FailureReason] {
        &self.reasons
    }

    /// Returns the distinct kinds present, in first-seen order.
    pub fn kinds(&self) -> Vec<FailureKind> {
        let mut kinds = Vec::new();
        for reason in &self.reasons {
            if !kinds.contains(&reason.kind()) {
                kinds.push(reason.kind());
            }
        }
        kinds
    }

    /// Returns true if any reason has the given kind.
    pub fn has_kind(&self, kind: FailureKind) -> bool {
        self.reasons.iter().any(|reason| reason.kind() == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_display_with_kind_prefix() {
        assert_eq!(
            FailureReason::MissingField { field: "answer" }.to_string(),
            "MissingField: answer"
        );
        assert_eq!(
            FailureReason::TypeMismatch {
                field: "insufficient_context".to_string(),
                expected: "boolean",
                found: "string",
            }
            .to_string(),
            "TypeMismatch: insufficient_context (expected boolean, found string)"
        );
        assert_eq!(
            FailureReason::UnexpectedField {
                field: "references".to_string()
            }
            .to_string(),
            "UnexpectedField: references"
        );
        assert_eq!(
            FailureReason::HallucinatedCitation {
                chunk_id: ChunkId::new("c9")
            }
            .to_string(),
            "HallucinatedCitation: c9 is not one of the supplied chunks"
        );
    }

    #[test]
    fn failure_display_joins_all_reasons() {
        let failure = ValidationFailure::new(vec![
            FailureReason::MissingField { field: "answer" },
            FailureReason::UnexpectedField {
                field: "notes".to_string(),
            },
        ]);

        assert_eq!(
            failure.to_string(),
            "generation failed validation: MissingField: answer; UnexpectedField: notes"
        );
        assert_eq!(
            failure.kinds(),
            vec![FailureKind::MissingField, FailureKind::UnexpectedField]
        );
        assert!(failure.has_kind(FailureKind::UnexpectedField));
        assert!(!failure.has_kind(FailureKind::TypeMismatch));
    }
}
