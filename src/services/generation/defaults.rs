//! Fill Defaults
//!
//! Replaces every marker still present after generation, well-formed or
//! truncated, with the polisher's deterministic default sentence and reports
//! each defaulted field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use report_narrator_core::{
    dangling_fragments, marker_regex, DocumentPath, PathSegment, MARKER_PREFIX,
};

use crate::services::polish::default_sentence;

/// One marker replaced by a default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultedField {
    pub path: DocumentPath,
    pub field_name: String,
    pub default: String,
    /// The marker was truncated (no closing bracket)
    #[serde(default)]
    pub dangling: bool,
}

/// Default every remaining marker in `document`.
pub fn fill_defaults(document: &mut Value) -> Vec<DefaultedField> {
    let mut defaulted = Vec::new();
    fill_value(document, &mut Vec::new(), &mut defaulted);
    for field in &defaulted {
        tracing::info!(
            path = %field.path,
            field = %field.field_name,
            dangling = field.dangling,
            "Field filled with default text"
        );
    }
    defaulted
}

fn fill_value(value: &mut Value, path: &mut Vec<PathSegment>, defaulted: &mut Vec<DefaultedField>) {
    match value {
        Value::String(text) => {
            if let Some(filled) = fill_text(text, path, defaulted) {
                *text = filled;
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                path.push(PathSegment::Index(index));
                fill_value(item, path, defaulted);
                path.pop();
            }
        }
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                path.push(PathSegment::Key(key.clone()));
                fill_value(item, path, defaulted);
                path.pop();
            }
        }
        _ => {}
    }
}

fn fill_text(text: &str, path: &[PathSegment], defaulted: &mut Vec<DefaultedField>) -> Option<String> {
    if !text.contains(MARKER_PREFIX) {
        return None;
    }
    let document_path = DocumentPath::from_segments(path.to_vec());

    let mut filled = marker_regex()
        .replace_all(text, |caps: &regex::Captures| {
            let field_name = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            let sentence = default_sentence(field_name);
            defaulted.push(DefaultedField {
                path: document_path.clone(),
                field_name: field_name.to_string(),
                default: sentence.to_string(),
                dangling: false,
            });
            sentence.to_string()
        })
        .into_owned();

    for fragment in dangling_fragments(&filled) {
        let field_name = fragment[MARKER_PREFIX.len()..].trim().to_string();
        let sentence = default_sentence(&field_name);
        filled = filled.replacen(&fragment, sentence, 1);
        defaulted.push(DefaultedField {
            path: document_path.clone(),
            field_name,
            default: sentence.to_string(),
            dangling: true,
        });
    }

    Some(filled)
}
