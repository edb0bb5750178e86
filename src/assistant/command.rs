// Pulling commands and explanations out of model replies
//
// The prompts ask for a single-line JSON object, but small local models wrap
// it in code fences, prepend chatter or skip the JSON entirely.

use serde_json::Value;

/// Strip leading/trailing markdown code fences (```json ... ``` or ``` ... ```)
pub fn strip_markdown_fences(s: &str) -> &str {
    let s = s.trim();
    let Some(rest) = s.strip_prefix("```") else {
        return s.trim_matches('`').trim();
    };
    // Drop a language tag such as `json` or `bash`
    let rest = match rest.split_once('\n') {
        Some((tag, body)) if tag.trim().chars().all(|c| c.is_ascii_alphanumeric()) => body,
        _ => rest,
    };
    match rest.rfind("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}

/// Slice from the first `open` to the last `close`, inclusive.
pub(crate) fn json_slice(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// String value of `field` in the reply's JSON object, if there is one.
pub fn json_field(text: &str, field: &str) -> Option<String> {
    let stripped = strip_markdown_fences(text);
    let value = serde_json::from_str::<Value>(stripped).ok().or_else(|| {
        json_slice(stripped, '{', '}').and_then(|slice| serde_json::from_str(slice).ok())
    })?;
    let text = match value.get(field)? {
        Value::String(s) => s.trim().to_string(),
        Value::Null => return None,
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// The command from a `{"cmd": ...}` reply, else the first non-JSON line.
pub fn extract_command(text: &str) -> Option<String> {
    if let Some(cmd) = json_field(text, "cmd").or_else(|| json_field(text, "command")) {
        return Some(cmd);
    }
    first_plain_line(text).map(|line| {
        let line = line.trim_matches('`').trim();
        line.strip_prefix("$ ").unwrap_or(line).to_string()
    })
}

/// The explanation from a `{"explanation": ...}` reply, else the first
/// non-JSON line.
pub fn extract_explanation(text: &str) -> Option<String> {
    json_field(text, "explanation").or_else(|| first_plain_line(text).map(str::to_string))
}

fn first_plain_line(text: &str) -> Option<&str> {
    strip_markdown_fences(text)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('{'))
}
