//! JSON object extraction from model output

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*\n(.*?)```").expect("fenced json pattern is valid"));

/// Parse a deliverable object out of a synthesis reply
///
/// Tries a fenced json block first, then the first balanced top-level
/// object. Anything else is wrapped as `{"content": raw}`.
pub fn parse_object(raw: &str) -> Map<String, Value> {
    debug!(len = raw.len(), "parse_object: called");

    let fenced = FENCED_JSON
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| as_object(m.as_str()));
    if let Some(object) = fenced {
        return object;
    }

    if let Some(object) = first_balanced_object(raw).and_then(as_object) {
        return object;
    }

    warn!("Synthesis reply held no JSON object; storing raw text");
    let mut fallback = Map::new();
    fallback.insert("content".to_string(), Value::String(raw.trim().to_string()));
    fallback
}

fn as_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "as_object: not valid json");
            None
        }
    }
}

/// Slice of the first `{...}` whose braces balance, ignoring braces in strings
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fenced_block() {
        let raw = "Here you go:\n```json\n{\"goals\": [\"ship\"], \"scope\": \"mvp\"}\n```\nAnything else?";
        let obj = parse_object(raw);
        assert_eq!(obj.get("scope"), Some(&json!("mvp")));
        assert_eq!(obj.get("goals"), Some(&json!(["ship"])));
    }

    #[test]
    fn test_bare_object_with_braces_in_strings() {
        let raw = "Sure. {\"summary\": \"use {braces} and \\\"quotes\\\"\", \"n\": {\"a\": 1}} trailing {junk}";
        let obj = parse_object(raw);
        assert_eq!(obj.get("summary"), Some(&json!("use {braces} and \"quotes\"")));
        assert_eq!(obj.get("n"), Some(&json!({"a": 1})));
    }

    #[test]
    fn test_invalid_fence_falls_back_to_balanced_object() {
        let raw = "```json\nnot json\n```\n{\"ok\": true}";
        assert_eq!(parse_object(raw).get("ok"), Some(&json!(true)));
    }

    #[test]
    fn test_plain_text_is_wrapped() {
        let obj = parse_object("  The document could not be structured.  ");
        assert_eq!(obj.len(), 1);
        assert_eq!(obj.get("content"), Some(&json!("The document could not be structured.")));
    }

    #[test]
    fn test_unbalanced_object_is_wrapped() {
        let obj = parse_object("{\"a\": 1");
        assert_eq!(obj.get("content"), Some(&json!("{\"a\": 1")));
    }

    #[test]
    fn test_array_is_not_an_object() {
        let obj = parse_object("```json\n[1, 2]\n```");
        assert!(obj.contains_key("content"));
    }
}
