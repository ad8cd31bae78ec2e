//! Tolerant extraction of a JSON object from model output.

use serde_json::{Map, Value};

/// Result of looking for a structured payload in generated text.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The first well-formed JSON object in the text
    Parsed(Map<String, Value>),
    /// No well-formed object was found; carries a short explanation
    Malformed(String),
}

/// Finds the first well-formed JSON object in `text`.
///
/// Leading prose, markdown fences and anything after the object are ignored.
/// Each `{` is tried in turn as the start of an object, so stray braces in
/// surrounding prose do not hide a valid payload that follows them. A
/// candidate that runs into the end of the text stops the scan: every later
/// `{` lies inside it, and a nested object is not the payload.
pub fn parse_structured(text: &str) -> ParseOutcome {
    if text.trim().is_empty() {
        return ParseOutcome::Malformed("the response was empty".to_string());
    }

    let mut last_error = None;
    for (offset, _) in text.match_indices('{') {
        let mut values = serde_json::Deserializer::from_str(&text[offset..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(Value::Object(map))) => return ParseOutcome::Parsed(map),
            Some(Ok(_)) | None => {}
            Some(Err(e)) if e.is_eof() => {
                last_error = Some(e);
                break;
            }
            Some(Err(e)) => last_error = Some(e),
        }
    }

    let detail = match last_error {
        Some(e) => format!("no well-formed JSON object found ({e})"),
        None => "no JSON object found in the response".to_string(),
    };
    ParseOutcome::Malformed(detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(text: &str) -> Map<String, Value> {
        match parse_structured(text) {
            ParseOutcome::Parsed(map) => map,
            ParseOutcome::Malformed(detail) => panic!("expected object, got: {detail}"),
        }
    }

    #[test]
    fn plain_object() {
        let map = parsed(r#"{"answer": "yes"}"#);
        assert_eq!(map["answer"], "yes");
    }

    #[test]
    fn object_wrapped_in_prose_and_fences() {
        let text = r#"Sure! Here's my answer:

```json
{"answer": "Test", "used_chunk_ids": [], "insufficient_context": false}
```

Hope this helps!"#;

        let map = parsed(text);
        assert_eq!(map["answer"], "Test");
    }

    #[test]
    fn stray_brace_before_payload_is_skipped() {
        let text = r#"Using {curly} braces: {"answer": "ok"}"#;
        let map = parsed(text);
        assert_eq!(map["answer"], "ok");
    }

    #[test]
    fn first_of_two_objects_wins() {
        let map = parsed(r#"{"answer": "first"} {"answer": "second"}"#);
        assert_eq!(map["answer"], "first");
    }

    #[test]
    fn braces_inside_strings_are_handled() {
        let map = parsed(r#"{"answer": "use } and { freely"}"#);
        assert_eq!(map["answer"], "use } and { freely");
    }

    #[test]
    fn no_object_is_malformed() {
        assert!(matches!(
            parse_structured("I don't know."),
            ParseOutcome::Malformed(detail) if detail.contains("no JSON object")
        ));
    }

    #[test]
    fn empty_response_is_malformed() {
        assert!(matches!(
            parse_structured("  \n "),
            ParseOutcome::Malformed(detail) if detail.contains("empty")
        ));
    }

    #[test]
    fn truncated_object_is_malformed() {
        assert!(matches!(
            parse_structured(r#"{"answer": "cut off"#),
            ParseOutcome::Malformed(detail) if detail.contains("no well-formed JSON object")
        ));
    }

    #[test]
    fn truncated_object_does_not_yield_its_nested_object() {
        let text = r#"{"answer": "x", "extra": {"note": 1}, "used_chunk_ids": ["c1"#;

        assert!(matches!(
            parse_structured(text),
            ParseOutcome::Malformed(detail) if detail.contains("EOF")
        ));
    }

    #[test]
    fn stray_brace_then_truncated_payload_is_malformed() {
        let text = r#"Using {curly} braces: {"answer": "ok", "meta": {"a": 1}"#;
        assert!(matches!(parse_structured(text), ParseOutcome::Malformed(_)));
    }

    #[test]
    fn top_level_array_is_not_an_object() {
        assert!(matches!(
            parse_structured(r#"["answer"]"#),
            ParseOutcome::Malformed(_)
        ));
    }
}
