//! Placeholder Context
//!
//! Builds the template variables for one placeholder from a snapshot of the
//! document taken before generation starts, so no placeholder ever sees a
//! sibling's generated text.

use serde::Serialize;
use serde_json::{Map, Value};

use report_narrator_core::{contains_marker_text, get_at, DocumentPath, Placeholder};

use crate::models::prompt::BatchField;

/// Keys tried, in order, for the report title
const TITLE_KEYS: &[&str] = &["title", "report_title", "client_name", "company_name"];

/// Variables available to a prompt's handlebars templates
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PromptContext {
    /// Field name as written in the marker, qualifier included
    pub field: String,
    pub base_field: String,
    /// The `<context>` of `<field> for <context>`
    pub qualifier: Option<String>,
    /// `key: value` lines describing the placeholder's surroundings
    pub context: String,
    /// The same facts as a JSON object string
    pub context_json: String,
    pub document_title: String,
}

/// Build the context for `placeholder` from the original document.
pub fn build_context(original: &Value, placeholder: &Placeholder) -> PromptContext {
    let own_key = match placeholder.path.last() {
        Some(report_narrator_core::PathSegment::Key(key)) => Some(key.as_str()),
        _ => None,
    };

    let enclosing = nearest_object(original, &placeholder.path);
    let local = enclosing
        .as_ref()
        .filter(|(path, _)| !path.is_empty())
        .map(|(_, map)| scalar_facts(map, own_key))
        .unwrap_or_default();
    let document = match original {
        Value::Object(map) => scalar_facts(map, None),
        _ => Map::new(),
    };

    let mut lines = Vec::new();
    if let Some(qualifier) = placeholder.qualifier() {
        lines.push(format!("subject: {}", qualifier));
    }
    for (key, value) in local.iter().chain(document.iter()) {
        lines.push(format!("{}: {}", key, display_scalar(value)));
    }

    let mut facts = Map::new();
    if let Some(qualifier) = placeholder.qualifier() {
        facts.insert("subject".to_string(), Value::String(qualifier.to_string()));
    }
    facts.insert("local".to_string(), Value::Object(local));
    facts.insert("document".to_string(), Value::Object(document));

    PromptContext {
        field: placeholder.field_name.clone(),
        base_field: placeholder.base_field_name().to_string(),
        qualifier: placeholder.qualifier().map(str::to_string),
        context: lines.join("\n"),
        context_json: Value::Object(facts).to_string(),
        document_title: document_title(original),
    }
}

/// Variables for the batch and verify prompts
#[derive(Debug, Clone, Serialize)]
pub struct BatchContext {
    pub document_json: String,
    pub fields_json: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_json: Option<String>,
    pub document_title: String,
}

pub fn build_batch_context(original: &Value, fields: &[&BatchField]) -> BatchContext {
    let described: Vec<Value> = fields
        .iter()
        .map(|field| {
            serde_json::json!({
                "key": field.key,
                "kind": field.kind,
                "description": field.description,
            })
        })
        .collect();

    BatchContext {
        document_json: serde_json::to_string_pretty(original).unwrap_or_else(|_| original.to_string()),
        fields_json: serde_json::to_string_pretty(&described).unwrap_or_default(),
        draft_json: None,
        document_title: document_title(original),
    }
}

/// First usable title-like string at the top level
pub fn document_title(original: &Value) -> String {
    TITLE_KEYS
        .iter()
        .filter_map(|key| original.get(*key).and_then(Value::as_str))
        .find(|title| !title.trim().is_empty() && !contains_marker_text(title))
        .unwrap_or_default()
        .to_string()
}

/// Deepest object on the way to `path`, with its own path
fn nearest_object<'a>(
    document: &'a Value,
    path: &DocumentPath,
) -> Option<(DocumentPath, &'a Map<String, Value>)> {
    let mut candidate = path.parent();
    while let Some(current) = candidate {
        if let Some(Value::Object(map)) = get_at(document, &current) {
            return Some((current, map));
        }
        candidate = current.parent();
    }
    None
}

/// Scalar, marker-free entries of an object
fn scalar_facts(map: &Map<String, Value>, skip: Option<&str>) -> Map<String, Value> {
    map.iter()
        .filter(|(key, _)| Some(key.as_str()) != skip)
        .filter(|(_, value)| match value {
            Value::String(text) => !text.trim().is_empty() && !contains_marker_text(text),
            Value::Number(_) | Value::Bool(_) => true,
            _ => false,
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn display_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
