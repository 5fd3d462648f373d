//! Text Helpers
//!
//! Cleanup shared by the generation and polish stages: code-fence removal
//! and lenient JSON extraction from model output.

use serde_json::Value;

/// Remove a code fence wrapping the whole text (```` ```json ... ``` ````).
///
/// Text that is not fence-wrapped is returned trimmed but otherwise unchanged.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let after_open = match trimmed.find('\n') {
        Some(pos) => &trimmed[pos + 1..],
        // Single-line fence such as ```text```
        None => trimmed.trim_start_matches('`').trim_start_matches(char::is_alphanumeric),
    };
    let body = after_open.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim().to_string()
}

/// Remove every line that is only a code fence (```` ``` ```` or ```` ```lang ````).
///
/// Returns the cleaned text and the number of fence lines removed.
pub fn remove_fence_lines(text: &str) -> (String, usize) {
    let mut removed = 0;
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            let is_fence = trimmed.starts_with("```")
                && trimmed[3..].chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_');
            if is_fence {
                removed += 1;
            }
            !is_fence
        })
        .collect();

    if removed == 0 {
        return (text.to_string(), 0);
    }
    (kept.join("\n"), removed)
}

/// Parse a JSON value out of model output.
///
/// Tries, in order: the text as-is, the text with a wrapping code fence
/// removed, and the outermost `{...}` or `[...]` span.
pub fn extract_json_value(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return Some(value);
    }

    let unfenced = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str::<Value>(&unfenced) {
        return Some(value);
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (unfenced.find(open), unfenced.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<Value>(&unfenced[start..=end]) {
                    return Some(value);
                }
            }
        }
    }

    None
}
