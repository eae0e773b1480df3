//! Extraction of structured payloads from free-text oracle responses.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

static OPENING_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_+\-]*[ \t]*\r?\n").expect("valid fence regex"));

/// Parse the span from the first `{` to the last `}` as a JSON object.
///
/// Returns `None` when there is no such span or it is not a JSON object.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        Ok(other) => {
            warn!(kind = json_kind(&other), "oracle response is not a JSON object");
            None
        }
        Err(err) => {
            warn!(error = %err, "failed to parse JSON from oracle response");
            None
        }
    }
}

/// Content between the first opening code fence and the last closing fence.
pub fn extract_code_block(text: &str) -> Option<String> {
    let opening = OPENING_FENCE_RE.find(text)?;
    let rest = &text[opening.end()..];
    let end = rest.rfind("```")?;
    Some(rest[..end].to_string())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_object_is_taken_from_surrounding_prose() {
        let text = "Sure! Here you go:\n{\"hot\": {\"description\": \"melts things\"}}\nDone.";
        let map = extract_json_object(text).expect("object");
        assert!(map.contains_key("hot"));
    }

    #[test]
    fn malformed_json_yields_none() {
        assert!(extract_json_object("no braces here").is_none());
        assert!(extract_json_object("{ not json }").is_none());
        assert!(extract_json_object("} backwards {").is_none());
    }

    #[test]
    fn code_block_spans_first_fence_to_last_fence() {
        let text = "intro\n```toml\n[properties]\nyou = \"controlled\"\n```\noutro";
        assert_eq!(
            extract_code_block(text).as_deref(),
            Some("[properties]\nyou = \"controlled\"\n")
        );
    }

    #[test]
    fn code_block_accepts_bare_fence() {
        let text = "```\ntransform = true\n```";
        assert_eq!(extract_code_block(text).as_deref(), Some("transform = true\n"));
    }

    #[test]
    fn missing_fence_yields_none() {
        assert!(extract_code_block("transform = true").is_none());
        assert!(extract_code_block("```toml\nunterminated").is_none());
    }
}
