//! Prompt Definition Models
//!
//! Data structures loaded from the prompt registry file.

use serde::{Deserialize, Serialize};

use report_narrator_core::DocumentPath;

/// Shape of the value a prompt produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    #[default]
    String,
    ArrayOfStrings,
    HtmlFragment,
}

impl OutputKind {
    pub fn is_array(&self) -> bool {
        matches!(self, OutputKind::ArrayOfStrings)
    }
}

/// Permissive output checks; violations are reported, never enforced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default)]
    pub forbidden_phrases: Vec<String>,
    #[serde(default)]
    pub required_phrases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length_chars: Option<usize>,
}

/// How one logical field is generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Registry key; filled from the map key when omitted in the file
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub output_kind: OutputKind,
    /// Output token budget for this field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_size: Option<u32>,
    #[serde(default)]
    pub system_instructions: String,
    pub user_template: String,
    #[serde(default)]
    pub constraints: Constraints,
    /// Flag the field for human review before delivery
    #[serde(default)]
    pub requires_approval: bool,
}

/// One row of the batch field table: a logical field name and where it lands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchField {
    /// Key in the batch response object
    pub key: String,
    /// Structural target in the document
    pub path: DocumentPath,
    #[serde(default)]
    pub kind: OutputKind,
    /// What the model should write for this field
    #[serde(default)]
    pub description: String,
}

/// Prompt text for the batch strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPrompts {
    #[serde(default = "default_batch_system")]
    pub system_instructions: String,
    /// Rendered with `document_json` and `fields_json`
    #[serde(default = "default_batch_user")]
    pub user_template: String,
    /// Rendered with `document_json`, `fields_json` and `draft_json`
    #[serde(default = "default_verify_user")]
    pub verify_template: String,
}

fn default_batch_system() -> String {
    "You write the narrative sections of a business report. Respond with a single JSON object and nothing else.".to_string()
}

fn default_batch_user() -> String {
    "Source data:\n{{document_json}}\n\nReturn a JSON object with exactly these fields:\n{{fields_json}}".to_string()
}

fn default_verify_user() -> String {
    "Source data:\n{{document_json}}\n\nDraft:\n{{draft_json}}\n\nVerify every field of the draft against the source data and correct anything unsupported. Return the corrected JSON object with the same fields:\n{{fields_json}}".to_string()
}

impl Default for BatchPrompts {
    fn default() -> Self {
        Self {
            system_instructions: default_batch_system(),
            user_template: default_batch_user(),
            verify_template: default_verify_user(),
        }
    }
}
