//! Prompt Registry
//!
//! Maps logical field names to prompt definitions. Loaded once from a JSON
//! file and read-only afterwards. A registry file that cannot be read or
//! is not JSON is fatal to the run; individual malformed entries are skipped
//! with a warning.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use report_narrator_core::base_field_name;

use super::render::PromptRenderer;
use crate::models::prompt::{BatchField, BatchPrompts, PromptDefinition};
use crate::utils::error::{AppError, AppResult};

/// Prompt ids with this prefix name internal templates and are rejected
const RESERVED_PREFIX: &str = "__";

const BATCH_SYSTEM: &str = "__batch__.system";
const BATCH_USER: &str = "__batch__.user";
const BATCH_VERIFY: &str = "__batch__.verify";

/// A system/user prompt pair ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

/// Loaded prompt definitions plus the batch field table
#[derive(Debug)]
pub struct PromptRegistry {
    prompts: BTreeMap<String, PromptDefinition>,
    batch_fields: Vec<BatchField>,
    renderer: PromptRenderer,
}

impl PromptRegistry {
    /// Load the registry file at `path`.
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::config(format!(
                "Cannot read prompt registry {}: {}",
                path.display(),
                e
            ))
        })?;
        let registry = Self::from_json_str(&content)?;
        tracing::info!(
            path = %path.display(),
            prompts = registry.len(),
            batch_fields = registry.batch_fields.len(),
            "Prompt registry loaded"
        );
        Ok(registry)
    }

    pub fn from_json_str(content: &str) -> AppResult<Self> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| AppError::config(format!("Prompt registry is not valid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Build from the parsed file.
    ///
    /// `prompts` may be an object keyed by id or an array of definitions
    /// carrying their own `id`.
    pub fn from_value(value: Value) -> AppResult<Self> {
        let Value::Object(mut root) = value else {
            return Err(AppError::config("Prompt registry must be a JSON object"));
        };

        let mut definitions = Vec::new();
        match root.remove("prompts") {
            Some(Value::Object(entries)) => {
                for (id, entry) in entries {
                    if let Some(mut definition) = parse_entry::<PromptDefinition>(&id, entry) {
                        if definition.id.is_empty() {
                            definition.id = id;
                        }
                        definitions.push(definition);
                    }
                }
            }
            Some(Value::Array(entries)) => {
                for (index, entry) in entries.into_iter().enumerate() {
                    if let Some(definition) =
                        parse_entry::<PromptDefinition>(&format!("prompts[{}]", index), entry)
                    {
                        if definition.id.is_empty() {
                            tracing::warn!(index, "Skipping prompt definition without id");
                            continue;
                        }
                        definitions.push(definition);
                    }
                }
            }
            Some(_) => {
                return Err(AppError::config(
                    "Prompt registry 'prompts' must be an object or array",
                ))
            }
            None => {}
        }

        let batch_fields = match root.remove("batch_fields") {
            Some(Value::Array(entries)) => entries
                .into_iter()
                .enumerate()
                .filter_map(|(index, entry)| {
                    parse_entry::<BatchField>(&format!("batch_fields[{}]", index), entry)
                })
                .collect(),
            Some(_) => {
                tracing::warn!("Ignoring 'batch_fields': expected an array");
                Vec::new()
            }
            None => Vec::new(),
        };

        let batch_prompts = root
            .remove("batch")
            .and_then(|entry| parse_entry::<BatchPrompts>("batch", entry))
            .unwrap_or_default();

        Self::build(definitions, batch_fields, batch_prompts)
    }

    /// Build from in-memory definitions.
    pub fn from_definitions(
        definitions: Vec<PromptDefinition>,
        batch_fields: Vec<BatchField>,
    ) -> AppResult<Self> {
        Self::build(definitions, batch_fields, BatchPrompts::default())
    }

    fn build(
        definitions: Vec<PromptDefinition>,
        batch_fields: Vec<BatchField>,
        batch_prompts: BatchPrompts,
    ) -> AppResult<Self> {
        let mut renderer = PromptRenderer::new();
        renderer.register(BATCH_SYSTEM, &batch_prompts.system_instructions)?;
        renderer.register(BATCH_USER, &batch_prompts.user_template)?;
        renderer.register(BATCH_VERIFY, &batch_prompts.verify_template)?;

        let mut prompts = BTreeMap::new();
        for definition in definitions {
            if definition.id.starts_with(RESERVED_PREFIX) {
                tracing::warn!(prompt = %definition.id, "Skipping prompt with reserved id prefix");
                continue;
            }
            let compiled = renderer
                .register(&system_name(&definition.id), &definition.system_instructions)
                .and_then(|_| renderer.register(&user_name(&definition.id), &definition.user_template));
            if let Err(err) = compiled {
                tracing::warn!(prompt = %definition.id, error = %err, "Skipping prompt with malformed template");
                continue;
            }
            prompts.insert(definition.id.clone(), definition);
        }

        Ok(Self {
            prompts,
            batch_fields,
            renderer,
        })
    }

    /// Look up the definition for a marker's field name.
    ///
    /// The exact name wins; otherwise the `for <context>` qualifier is
    /// stripped and the base name is tried.
    pub fn get(&self, field_name: &str) -> Option<&PromptDefinition> {
        self.prompts
            .get(field_name)
            .or_else(|| self.prompts.get(base_field_name(field_name)))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.prompts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn batch_fields(&self) -> &[BatchField] {
        &self.batch_fields
    }

    /// Render the system/user pair of prompt `id`.
    pub fn render<T: Serialize>(&self, id: &str, context: &T) -> AppResult<RenderedPrompt> {
        Ok(RenderedPrompt {
            system: self.renderer.render(&system_name(id), context)?,
            user: self.renderer.render(&user_name(id), context)?,
        })
    }

    /// Render the composite batch prompt.
    pub fn render_batch<T: Serialize>(&self, context: &T) -> AppResult<RenderedPrompt> {
        Ok(RenderedPrompt {
            system: self.renderer.render(BATCH_SYSTEM, context)?,
            user: self.renderer.render(BATCH_USER, context)?,
        })
    }

    /// Render the verify-and-correct prompt for a batch draft.
    pub fn render_verify<T: Serialize>(&self, context: &T) -> AppResult<RenderedPrompt> {
        Ok(RenderedPrompt {
            system: self.renderer.render(BATCH_SYSTEM, context)?,
            user: self.renderer.render(BATCH_VERIFY, context)?,
        })
    }
}

fn system_name(id: &str) -> String {
    format!("{}.system", id)
}

fn user_name(id: &str) -> String {
    format!("{}.user", id)
}

fn parse_entry<T: serde::de::DeserializeOwned>(label: &str, entry: Value) -> Option<T> {
    match serde_json::from_value(entry) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            tracing::warn!(entry = %label, error = %err, "Skipping malformed prompt registry entry");
            None
        }
    }
}
