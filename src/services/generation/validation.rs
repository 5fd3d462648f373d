//! Output Shaping and Validation
//!
//! Turns raw model text into the value a prompt's output kind calls for,
//! checks it against the prompt's constraints (permissively: violations are
//! reported, never enforced), and writes it into the document.

use serde_json::Value;

use report_narrator_core::{
    array_write_target, extract_json_value, get_at, set_at, strip_code_fences, CoreError,
    CoreResult, DocumentPath, Placeholder,
};
use report_narrator_llm::GeneratedText;

use crate::models::prompt::{OutputKind, PromptDefinition};

/// Token a model emits when the source data cannot support the field
pub const INSUFFICIENT_EVIDENCE: &str = "[INSUFFICIENT_EVIDENCE]";

/// Shape model output for `kind`. `None` when nothing usable remains.
pub fn shape_output(generated: &GeneratedText, kind: OutputKind) -> Option<Value> {
    match kind {
        OutputKind::ArrayOfStrings => {
            let parsed = generated
                .structured
                .clone()
                .or_else(|| extract_json_value(&generated.text));
            match parsed.and_then(|value| shape_value(value, kind)) {
                Some(value) => Some(value),
                None => lines_to_array(&generated.text),
            }
        }
        OutputKind::String | OutputKind::HtmlFragment => {
            let text = strip_code_fences(&generated.text);
            (!text.is_empty()).then_some(Value::String(text))
        }
    }
}

/// Coerce an already-parsed value (e.g. one batch field) to `kind`.
pub fn shape_value(value: Value, kind: OutputKind) -> Option<Value> {
    match (kind, value) {
        (OutputKind::ArrayOfStrings, Value::Array(items)) => {
            let strings: Vec<Value> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(text) => {
                        let text = text.trim().to_string();
                        (!text.is_empty()).then_some(Value::String(text))
                    }
                    Value::Null => None,
                    other => Some(Value::String(other.to_string())),
                })
                .collect();
            (!strings.is_empty()).then_some(Value::Array(strings))
        }
        (OutputKind::ArrayOfStrings, Value::String(text)) => lines_to_array(&text),
        (OutputKind::ArrayOfStrings, Value::Object(map)) => {
            // A wrapper object such as {"items": [...]}
            map.into_iter()
                .find_map(|(_, inner)| inner.is_array().then_some(inner))
                .and_then(|inner| shape_value(inner, OutputKind::ArrayOfStrings))
        }
        (_, Value::String(text)) => {
            let text = strip_code_fences(&text);
            (!text.is_empty()).then_some(Value::String(text))
        }
        (_, Value::Array(items)) => {
            let joined = items
                .iter()
                .map(|item| item.as_str().map(str::to_string).unwrap_or_else(|| item.to_string()))
                .collect::<Vec<_>>()
                .join("\n");
            (!joined.trim().is_empty()).then_some(Value::String(joined))
        }
        (_, Value::Null) => None,
        (_, other) => Some(Value::String(other.to_string())),
    }
}

/// Split text into non-empty lines, dropping bullet and numbering prefixes.
fn lines_to_array(text: &str) -> Option<Value> {
    let items: Vec<Value> = strip_code_fences(text)
        .lines()
        .map(strip_bullet)
        .filter(|line| !line.is_empty())
        .map(|line| Value::String(line.to_string()))
        .collect();
    (!items.is_empty()).then_some(Value::Array(items))
}

fn strip_bullet(line: &str) -> &str {
    let line = line.trim();
    let line = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "))
        .unwrap_or(line);
    // "1. " / "2) "
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return stripped.trim();
        }
    }
    line.trim()
}

/// Constraint violations for a shaped value; empty when it passes.
pub fn validate_output(value: &Value, definition: &PromptDefinition) -> Vec<String> {
    let text = match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    };
    let lowered = text.to_lowercase();
    let constraints = &definition.constraints;
    let mut violations = Vec::new();

    if let Some(max) = constraints.max_length_chars {
        let length = text.chars().count();
        if length > max {
            violations.push(format!("output is {} characters, limit is {}", length, max));
        }
    }
    for phrase in &constraints.forbidden_phrases {
        if lowered.contains(&phrase.to_lowercase()) {
            violations.push(format!("contains forbidden phrase '{}'", phrase));
        }
    }
    for phrase in &constraints.required_phrases {
        if !lowered.contains(&phrase.to_lowercase()) {
            violations.push(format!("missing required phrase '{}'", phrase));
        }
    }
    if text.contains(INSUFFICIENT_EVIDENCE) {
        violations.push("model reported insufficient evidence".to_string());
    }

    violations
}

/// Write a resolved value for `placeholder`; returns the path written.
///
/// A marker embedded in surrounding text has just its marker substring
/// replaced (arrays are joined with `; `). A whole-value marker is replaced
/// outright, retargeting to the parent array when a singleton array of the
/// marker receives an array value.
pub fn write_resolved(
    document: &mut Value,
    placeholder: &Placeholder,
    value: Value,
) -> CoreResult<DocumentPath> {
    if placeholder.is_whole_value() {
        let target = array_write_target(document, placeholder, &value);
        set_at(document, &target, value)?;
        return Ok(target);
    }

    let current = get_at(document, &placeholder.path)
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::not_found(placeholder.path.to_string()))?;
    if !current.contains(&placeholder.marker) {
        return Err(CoreError::not_found(format!(
            "{} no longer holds {}",
            placeholder.path, placeholder.marker
        )));
    }

    let replacement = match &value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).unwrap_or_else(|| item.to_string()))
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    };
    let updated = current.replacen(&placeholder.marker, &replacement, 1);
    set_at(document, &placeholder.path, Value::String(updated))?;
    Ok(placeholder.path.clone())
}
