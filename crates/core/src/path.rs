//! Structured Document Paths
//!
//! A path addresses one node inside a JSON document as an ordered sequence of
//! typed segments (map key or sequence index). Paths are built by the marker
//! scanner and consumed by `get_at` / `set_at`; the dotted string form
//! (`a.b[3].c`) exists for logging, configuration files, and run statistics.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};

/// One step into a document: a map key or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    fn container(&self) -> &'static str {
        match self {
            PathSegment::Key(_) => "object",
            PathSegment::Index(_) => "array",
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Structural address of a node inside a document.
///
/// The empty path addresses the document root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DocumentPath(Vec<PathSegment>);

impl DocumentPath {
    /// The root path
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from segments
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    /// Parse the dotted debug form, e.g. `scorecard.rows[2].risk`.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let raw = raw.trim();
        let mut segments = Vec::new();
        if raw.is_empty() || raw == "$" {
            return Ok(Self(segments));
        }

        for part in raw.split('.') {
            let (key, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if key.is_empty() && rest.is_empty() {
                return Err(CoreError::invalid_path(raw, "empty segment"));
            }
            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_string()));
            }
            while !rest.is_empty() {
                let close = rest
                    .find(']')
                    .ok_or_else(|| CoreError::invalid_path(raw, "unclosed index bracket"))?;
                if !rest.starts_with('[') {
                    return Err(CoreError::invalid_path(raw, "unexpected text after index"));
                }
                let index: usize = rest[1..close]
                    .trim()
                    .parse()
                    .map_err(|_| CoreError::invalid_path(raw, "index is not a number"))?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
            }
        }

        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    /// Path one level up, or `None` for the root.
    pub fn parent(&self) -> Option<DocumentPath> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Child path under a map key
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Key(key.into()));
        Self(segments)
    }

    /// Child path under a sequence index
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(index));
        Self(segments)
    }

    /// Whether `self` is `other` or lies underneath it.
    pub fn starts_with(&self, other: &DocumentPath) -> bool {
        self.0.len() >= other.0.len() && self.0[..other.0.len()] == other.0[..]
    }

    fn prefix(&self, len: usize) -> String {
        Self(self.0[..len].to_vec()).to_string()
    }
}

impl std::fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "$");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i == 0 => write!(f, "{}", key)?,
                PathSegment::Key(key) => write!(f, ".{}", key)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

impl Serialize for DocumentPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DocumentPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DocumentPath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Read the value at `path`, if every segment resolves.
pub fn get_at<'a>(document: &'a Value, path: &DocumentPath) -> Option<&'a Value> {
    let mut current = document;
    for segment in path.segments() {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key)?,
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Largest number of null slots `set_at` pads an array with
pub const MAX_INDEX_GAP: usize = 64;

/// Write `value` at `path`, creating missing intermediate containers.
///
/// A missing (or null) node becomes an object when the segment addressing
/// into it is a key and an array when it is an index. Arrays shorter than the
/// requested index are padded with nulls, at most `MAX_INDEX_GAP` past the
/// end; a farther index is an `InvalidPath`. Addressing into an existing
/// scalar is a `TypeMismatch`.
pub fn set_at(document: &mut Value, path: &DocumentPath, value: Value) -> CoreResult<()> {
    let mut current = document;

    for (depth, segment) in path.segments().iter().enumerate() {
        if current.is_null() {
            *current = match segment {
                PathSegment::Key(_) => Value::Object(Map::new()),
                PathSegment::Index(_) => Value::Array(Vec::new()),
            };
        }

        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => {
                map.entry(key.clone()).or_insert(Value::Null)
            }
            (PathSegment::Index(index), Value::Array(items)) => {
                if *index > items.len().saturating_add(MAX_INDEX_GAP) {
                    return Err(CoreError::invalid_path(
                        path.to_string(),
                        format!(
                            "index {} is more than {} past the end of a {}-element array",
                            index,
                            MAX_INDEX_GAP,
                            items.len()
                        ),
                    ));
                }
                if items.len() <= *index {
                    items.resize(*index + 1, Value::Null);
                }
                &mut items[*index]
            }
            (segment, other) => {
                return Err(CoreError::TypeMismatch {
                    path: path.prefix(depth),
                    expected: segment.container(),
                    found: kind_name(other),
                });
            }
        };
    }

    *current = value;
    Ok(())
}
