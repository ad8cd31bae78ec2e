use serde::Serialize;

use super::ChunkId;

/// A generated answer that satisfied the output schema and citation check.
///
/// Serializes to exactly the three schema fields:
/// `answer`, `used_chunk_ids` and `insufficient_context`. Only the resolver
/// constructs one, so it cannot be read back from JSON:
///
/// ```compile_fail
/// let _: ragline::ValidatedAnswer = serde_json::from_str(
///     r#"{"answer": "a", "used_chunk_ids": ["c9"], "insufficient_context": false}"#,
/// ).unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedAnswer {
    answer: String,
    used_chunk_ids: Vec<ChunkId>,
    insufficient_context: bool,
}

impl ValidatedAnswer {
    pub(crate) fn new(
        answer: String,
        used_chunk_ids: Vec<ChunkId>,
        insufficient_context: bool,
    ) -> Self {
        Self {
            answer,
            used_chunk_ids,
            insufficient_context,
        }
    }

    /// Returns the answer text.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Returns the ids of the chunks the answer was built from, in the order
    /// the model listed them.
    pub fn used_chunk_ids(&self) -> &[ChunkId] {
        &self.used_chunk_ids
    }

    /// Returns true if the model reported that the context could not answer
    /// the question.
    pub fn insufficient_context(&self) -> bool {
        self.insufficient_context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_exactly_the_schema_fields() {
        let answer = ValidatedAnswer::new(
            "Refunds are issued within 14 days.".to_string(),
            vec![ChunkId::new("c1"), ChunkId::new("c3")],
            false,
        );

        let value = serde_json::to_value(&answer).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj.len(), 3);
        assert_eq!(obj["answer"], "Refunds are issued within 14 days.");
        assert_eq!(obj["used_chunk_ids"], serde_json::json!(["c1", "c3"]));
        assert_eq!(obj["insufficient_context"], false);
    }
}
