//! Lenient extraction of structured answers from model output.
//!
//! The drafting endpoints wrap JSON in prose or code fences often enough
//! that strict parsing would turn routine responses into errors. Every
//! helper here degrades to an empty/neutral value instead.

use serde::de::DeserializeOwned;

/// Parse the first JSON value found in `text`, tolerating code fences and
/// surrounding prose. Returns `None` on anything unparseable.
pub fn lenient_json<T: DeserializeOwned>(text: &str) -> Option<T> {
    let candidate = strip_fences(text);
    if let Ok(v) = serde_json::from_str::<T>(candidate.trim()) {
        return Some(v);
    }
    // Fall back to the outermost bracketed span.
    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(start), Some(end)) = (candidate.find(open), candidate.rfind(close)) {
            if end > start {
                if let Ok(v) = serde_json::from_str::<T>(&candidate[start..=end]) {
                    return Some(v);
                }
            }
        }
    }
    None
}

/// Interpret a yes/no style answer. Defaults to `false` when unclear.
pub fn lenient_bool(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    lower.starts_with("yes") || lower.starts_with("true") || lower.contains("\"enough\": true")
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag line, then the closing fence.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
