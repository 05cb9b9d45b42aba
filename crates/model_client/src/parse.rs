//! Structured-reply extraction
//!
//! Models wrap JSON in prose or code fences. The reply is searched for the
//! outermost `{ ... }` span; when that does not parse the text is kept
//! under `"analysis"` so downstream stages still receive an object.

use serde_json::{json, Value};

/// Parse the outermost JSON object in `text`, if any
pub fn extract_json(text: &str) -> Option<Value> {
    let stripped = strip_code_fence(text);
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(stripped) {
        return Some(value);
    }

    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&stripped[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// JSON object from the reply, or `{"analysis": text}`
pub fn parse_structured(text: &str) -> Value {
    extract_json(text).unwrap_or_else(|| json!({ "analysis": text.trim() }))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the language tag line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
