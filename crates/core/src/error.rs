//! Core Error Types
//!
//! Defines the foundational error types used across the Report Narrator
//! workspace. These error types are dependency-free (only thiserror + std) to
//! keep the core crate lightweight.
//!
//! The main application crate extends these with additional variants
//! (configuration, templating, provider failures) that need heavier
//! dependencies.

use thiserror::Error;

/// Core error type for the Report Narrator workspace.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// A path string could not be parsed into segments
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A path segment addressed a node of the wrong container type
    #[error("Type mismatch at '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A path did not resolve to any value
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convert CoreError to a string
impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_path_display() {
        let err = CoreError::invalid_path("a..b", "empty segment");
        assert_eq!(err.to_string(), "Invalid path 'a..b': empty segment");
    }

    #[test]
    fn test_type_mismatch_display() {
        let err = CoreError::TypeMismatch {
            path: "a.b".to_string(),
            expected: "object",
            found: "string",
        };
        assert!(err.to_string().contains("expected object, found string"));
    }

    #[test]
    fn test_error_conversion() {
        let err = CoreError::not_found("a.b[2]");
        let msg: String = err.into();
        assert_eq!(msg, "Not found: a.b[2]");
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let err: CoreError = parse_err.into();
        assert!(matches!(err, CoreError::Serialization(_)));
    }
}
