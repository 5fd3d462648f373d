//! Marker Scanning
//!
//! Finds typed placeholder markers of the form `[MARKER: <field>]` (optionally
//! `[MARKER: <field> for <context>]`) anywhere inside a JSON document.
//!
//! Traversal is depth-first: object entries in insertion order, array
//! elements in index order. Truncated markers (`[MARKER: foo` with no closing
//! bracket) are never reported as placeholders; `find_dangling_markers`
//! reports them separately so callers can guard against shipping them.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::{get_at, DocumentPath, PathSegment};

/// Literal prefix shared by well-formed and truncated markers.
pub const MARKER_PREFIX: &str = "[MARKER:";

/// Separator between a field name and its disambiguating context.
const QUALIFIER_SEPARATOR: &str = " for ";

/// Compiled marker pattern (initialized once).
pub fn marker_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[MARKER:\s*([^\[\]]+?)\s*\]").expect("marker pattern is a valid regex")
    })
}

/// One marker occurrence inside the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    /// Where the string holding the marker lives
    pub path: DocumentPath,
    /// Requested field, including any `for <context>` qualifier
    pub field_name: String,
    /// The exact marker text matched (`[MARKER: ...]`)
    pub marker: String,
    /// The full string value the marker was found in
    pub raw: String,
}

impl Placeholder {
    /// Field name with the `for <context>` qualifier stripped, used for
    /// prompt registry lookup.
    pub fn base_field_name(&self) -> &str {
        base_field_name(&self.field_name)
    }

    /// The `<context>` part of `<field> for <context>`, if present.
    pub fn qualifier(&self) -> Option<&str> {
        self.field_name
            .split_once(QUALIFIER_SEPARATOR)
            .map(|(_, context)| context.trim())
            .filter(|context| !context.is_empty())
    }

    /// Whether the marker makes up the entire string value.
    pub fn is_whole_value(&self) -> bool {
        self.raw.trim() == self.marker
    }
}

/// Strip a trailing `for <context>` qualifier from a field name.
pub fn base_field_name(field_name: &str) -> &str {
    field_name
        .split_once(QUALIFIER_SEPARATOR)
        .map(|(base, _)| base)
        .unwrap_or(field_name)
        .trim()
}

/// A marker prefix with no closing bracket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingMarker {
    pub path: DocumentPath,
    /// Text from the marker prefix to the end of the string
    pub fragment: String,
}

/// Every well-formed marker in the document, in depth-first order.
pub fn scan(document: &Value) -> Vec<Placeholder> {
    let mut found = Vec::new();
    walk_strings(document, &DocumentPath::root(), &mut |path: &DocumentPath, text: &str| {
        for captures in marker_regex().captures_iter(text) {
            let marker = captures.get(0).map(|m| m.as_str()).unwrap_or_default();
            let field_name = captures.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            if field_name.is_empty() {
                continue;
            }
            found.push(Placeholder {
                path: path.clone(),
                field_name: field_name.to_string(),
                marker: marker.to_string(),
                raw: text.to_string(),
            });
        }
    });
    found
}

/// Every truncated marker (prefix present, closing bracket missing).
pub fn find_dangling_markers(document: &Value) -> Vec<DanglingMarker> {
    let mut found = Vec::new();
    walk_strings(document, &DocumentPath::root(), &mut |path: &DocumentPath, text: &str| {
        for fragment in dangling_fragments(text) {
            found.push(DanglingMarker {
                path: path.clone(),
                fragment,
            });
        }
    });
    found
}

/// Truncated marker fragments within a single string.
pub fn dangling_fragments(text: &str) -> Vec<String> {
    let without_complete = marker_regex().replace_all(text, "");
    let mut fragments = Vec::new();
    let mut rest: &str = &without_complete;
    while let Some(start) = rest.find(MARKER_PREFIX) {
        let tail = &rest[start..];
        let end = tail[MARKER_PREFIX.len()..]
            .find(|c: char| matches!(c, '\n' | '<' | '[' | '"' | '\\'))
            .map(|pos| pos + MARKER_PREFIX.len())
            .unwrap_or(tail.len());
        fragments.push(tail[..end].to_string());
        rest = &tail[end..];
    }
    fragments
}

/// Whether any marker text, complete or truncated, remains in `text`.
pub fn contains_marker_text(text: &str) -> bool {
    text.contains(MARKER_PREFIX)
}

/// Whether any string in the document still carries marker text.
pub fn document_has_markers(document: &Value) -> bool {
    let mut any = false;
    walk_strings(document, &DocumentPath::root(), &mut |_: &DocumentPath, text: &str| {
        any |= contains_marker_text(text);
    });
    any
}

/// Where an array-shaped value for `placeholder` should be written.
///
/// A placeholder that is the only element of its parent array stands for the
/// whole array, so an array value replaces the parent rather than nesting a
/// new array inside it. Everything else writes at the placeholder's own path.
pub fn array_write_target(document: &Value, placeholder: &Placeholder, value: &Value) -> DocumentPath {
    if !value.is_array() || !placeholder.is_whole_value() {
        return placeholder.path.clone();
    }
    if placeholder.path.last() != Some(&PathSegment::Index(0)) {
        return placeholder.path.clone();
    }
    match placeholder.path.parent() {
        Some(parent) => match get_at(document, &parent) {
            Some(Value::Array(items)) if items.len() == 1 => parent,
            _ => placeholder.path.clone(),
        },
        None => placeholder.path.clone(),
    }
}

fn walk_strings(value: &Value, path: &DocumentPath, visit: &mut dyn FnMut(&DocumentPath, &str)) {
    match value {
        Value::String(text) => visit(path, text),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                walk_strings(item, &path.index(index), visit);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                walk_strings(item, &path.key(key.as_str()), visit);
            }
        }
        _ => {}
    }
}
