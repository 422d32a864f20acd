//! Best-effort structured data recovery from free-form model output.
//!
//! Search order, in decreasing confidence:
//! 1. a fenced code block tagged `json`
//! 2. the outermost brace-delimited span, then the first balanced object
//! 3. the whole text
//!
//! Every failure falls through to the next stage; total failure yields an
//! empty mapping. Nothing here returns an error.

use crate::models::Record;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// Recover a JSON object from `text`, or an empty mapping.
pub fn extract_mapping(text: &str) -> Record {
    if let Some(map) = fenced_blocks(text).into_iter().find_map(parse_object) {
        return map;
    }

    if let Some(map) = outer_brace_span(text).and_then(parse_object) {
        return map;
    }

    if let Some(map) = first_balanced_object(text).and_then(parse_object) {
        return map;
    }

    if let Some(map) = parse_object(text.trim()) {
        return map;
    }

    debug!(chars = text.len(), "No structured data recovered from model output");
    Record::new()
}

/// Typed variant of [`extract_mapping`]; `None` when the mapping is empty or
/// does not fit `T`.
pub fn extract_as<T: DeserializeOwned>(text: &str) -> Option<T> {
    let map = extract_mapping(text);
    if map.is_empty() {
        return None;
    }
    serde_json::from_value(Value::Object(map)).ok()
}

fn parse_object(candidate: &str) -> Option<Record> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Contents of every ```json fence, in order of appearance.
fn fenced_blocks(text: &str) -> Vec<&str> {
    // ASCII lowering keeps byte offsets aligned with `text`
    let lowered = text.to_ascii_lowercase();
    let mut blocks = Vec::new();
    let mut cursor = 0;

    while let Some(rel) = lowered[cursor..].find("```json") {
        let body_start = cursor + rel + "```json".len();
        let Some(rel_end) = lowered[body_start..].find("```") else {
            break;
        };
        let body_end = body_start + rel_end;
        blocks.push(&text[body_start..body_end]);
        cursor = body_end + 3;
    }

    blocks
}

fn outer_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// First `{ ... }` whose braces balance, ignoring braces inside strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth: i32 = 0;
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
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}
