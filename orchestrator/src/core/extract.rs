//! Extraction of a JSON object body from free-form generator output.

use std::sync::LazyLock;

use regex::Regex;

static JSON_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```json\s*(.*?)```").expect("json fence regex should be valid")
});

static ANY_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*(.*?)```").expect("fence regex should be valid")
});

/// Strip markdown fences and narrow to the outermost `{...}` span.
///
/// A ```` ```json ```` fence wins over an untagged one. When no braces are
/// found the trimmed text is returned unchanged and JSON parsing reports the
/// failure.
pub fn extract_json_body(text: &str) -> &str {
    let trimmed = text.trim();
    let fenced = JSON_FENCE_RE
        .captures(trimmed)
        .or_else(|| ANY_FENCE_RE.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map(|body| body.as_str().trim())
        .unwrap_or(trimmed);

    match (fenced.find('{'), fenced.rfind('}')) {
        (Some(start), Some(end)) if end > start => &fenced[start..=end],
        _ => fenced,
    }
}
