//! Report Narrator Core
//!
//! Foundational document types for the Report Narrator workspace. This crate
//! has no dependency on providers, configuration, or the async runtime.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `path` - Structured document paths and `get_at` / `set_at`
//! - `marker` - Placeholder marker scanning and the array retarget rule
//! - `text` - Code-fence stripping and lenient JSON extraction

pub mod error;
pub mod marker;
pub mod path;
pub mod text;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Paths ──────────────────────────────────────────────────────────────
pub use path::{get_at, set_at, DocumentPath, PathSegment, MAX_INDEX_GAP};

// ── Markers ────────────────────────────────────────────────────────────
pub use marker::{
    array_write_target, base_field_name, contains_marker_text, dangling_fragments,
    document_has_markers, find_dangling_markers, marker_regex, scan, DanglingMarker,
    Placeholder, MARKER_PREFIX,
};

// ── Text Helpers ───────────────────────────────────────────────────────
pub use text::{extract_json_value, remove_fence_lines, strip_code_fences};
