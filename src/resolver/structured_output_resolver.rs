//! Schema and citation validation of generated answers.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::composer::PromptContext;
use crate::models::{ChunkId, RawGeneration, ValidatedAnswer};

use super::extract::{ParseOutcome, parse_structured};
use super::types::{FailureReason, ValidationFailure};

const ANSWER: &str = "answer";
const USED_CHUNK_IDS: &str = "used_chunk_ids";
const INSUFFICIENT_CONTEXT: &str = "insufficient_context";
const SCHEMA_FIELDS: [&str; 3] = [ANSWER, USED_CHUNK_IDS, INSUFFICIENT_CONTEXT];

/// Turns raw generations into [`ValidatedAnswer`]s or detailed failures.
///
/// Validation runs in three steps: extraction of the first well-formed JSON
/// object, schema checks reporting every problem found, and a citation check
/// against the chunks included in the attempt's prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredOutputResolver;

impl StructuredOutputResolver {
    /// Creates a resolver.
    pub fn new() -> Self {
        Self
    }

    /// Validates `raw` against the answer schema and the chunks in `context`.
    pub fn resolve(
        &self,
        raw: &RawGeneration,
        context: &PromptContext,
    ) -> Result<ValidatedAnswer, ValidationFailure> {
        let result = match parse_structured(raw.text()) {
            ParseOutcome::Parsed(object) => validate_schema(&object)
                .and_then(|answer| check_citations(answer, context)),
            ParseOutcome::Malformed(detail) => Err(ValidationFailure::single(
                FailureReason::MalformedOutput { detail },
            )),
        };

        match &result {
            Ok(answer) => debug!(
                attempt = raw.attempt(),
                cited = answer.used_chunk_ids().len(),
                insufficient_context = answer.insufficient_context(),
                "generation validated"
            ),
            Err(failure) => warn!(
                attempt = raw.attempt(),
                reasons = %failure,
                "generation rejected"
            ),
        }

        result
    }
}

fn validate_schema(object: &Map<String, Value>) -> Result<ValidatedAnswer, ValidationFailure> {
    let mut reasons = Vec::new();

    let answer = match object.get(ANSWER) {
        None => {
            reasons.push(FailureReason::MissingField { field: ANSWER });
            None
        }
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => {
            reasons.push(type_mismatch(ANSWER.to_string(), "string", other));
            None
        }
    };

    let used_chunk_ids = match object.get(USED_CHUNK_IDS) {
        None => {
            reasons.push(FailureReason::MissingField {
                field: USED_CHUNK_IDS,
            });
            None
        }
        Some(Value::Array(items)) => {
            let mut ids = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                match item {
                    Value::String(id) => ids.push(ChunkId::new(id.as_str())),
                    other => reasons.push(type_mismatch(
                        format!("{USED_CHUNK_IDS}[{index}]"),
                        "string",
                        other,
                    )),
                }
            }
            Some(ids)
        }
        Some(other) => {
            reasons.push(type_mismatch(
                USED_CHUNK_IDS.to_string(),
                "array of strings",
                other,
            ));
            None
        }
    };

    let insufficient_context = match object.get(INSUFFICIENT_CONTEXT) {
        None => {
            reasons.push(FailureReason::MissingField {
                field: INSUFFICIENT_CONTEXT,
            });
            None
        }
        Some(Value::Bool(flag)) => Some(*flag),
        Some(other) => {
            reasons.push(type_mismatch(
                INSUFFICIENT_CONTEXT.to_string(),
                "boolean",
                other,
            ));
            None
        }
    };

    let mut unexpected: Vec<&String> = object
        .keys()
        .filter(|key| !SCHEMA_FIELDS.contains(&key.as_str()))
        .collect();
    unexpected.sort();
    reasons.extend(
        unexpected
            .into_iter()
            .map(|field| FailureReason::UnexpectedField {
                field: field.clone(),
            }),
    );

    match (answer, used_chunk_ids, insufficient_context) {
        (Some(answer), Some(ids), Some(flag)) if reasons.is_empty() => {
            Ok(ValidatedAnswer::new(answer, ids, flag))
        }
        _ => Err(ValidationFailure::new(reasons)),
    }
}

fn check_citations(
    answer: ValidatedAnswer,
    context: &PromptContext,
) -> Result<ValidatedAnswer, ValidationFailure> {
    let reasons: Vec<FailureReason> = {
        let mut seen = HashSet::new();
        answer
            .used_chunk_ids()
            .iter()
            .filter(|id| !context.contains_chunk(id))
            .filter(|id| seen.insert(id.as_str()))
            .map(|id| FailureReason::HallucinatedCitation {
                chunk_id: id.clone(),
            })
            .collect()
    };

    if reasons.is_empty() {
        Ok(answer)
    } else {
        Err(ValidationFailure::new(reasons))
    }
}

fn type_mismatch(field: String, expected: &'static str, found: &Value) -> FailureReason {
    FailureReason::TypeMismatch {
        field,
        expected,
        found: json_type(found),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
