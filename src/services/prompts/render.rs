//! Prompt Rendering
//!
//! Thin wrapper over a handlebars registry. Prompts are plain text, so HTML
//! escaping is disabled and missing variables render as empty strings.

use handlebars::Handlebars;
use serde::Serialize;

use crate::utils::error::{AppError, AppResult};

/// Compiled prompt templates, addressed by name
pub struct PromptRenderer {
    handlebars: Handlebars<'static>,
}

impl std::fmt::Debug for PromptRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.handlebars.get_templates().keys().collect();
        names.sort();
        f.debug_struct("PromptRenderer").field("templates", &names).finish()
    }
}

impl Default for PromptRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptRenderer {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(false);
        Self { handlebars }
    }

    /// Compile and store `template` under `name`.
    pub fn register(&mut self, name: &str, template: &str) -> AppResult<()> {
        self.handlebars
            .register_template_string(name, template)
            .map_err(|e| AppError::template(format!("{}: {}", name, e)))
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlebars.has_template(name)
    }

    /// Render a registered template.
    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> AppResult<String> {
        if !self.has(name) {
            return Err(AppError::not_found(format!("template {}", name)));
        }
        Ok(self.handlebars.render(name, data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_without_escaping() {
        let mut renderer = PromptRenderer::new();
        renderer
            .register("risk", "Risk for {{qualifier}}: <{{context}}>")
            .unwrap();
        let out = renderer
            .render("risk", &json!({"qualifier": "CategoryX", "context": "a & b"}))
            .unwrap();
        assert_eq!(out, "Risk for CategoryX: <a & b>");
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let mut renderer = PromptRenderer::new();
        renderer.register("t", "[{{missing}}]").unwrap();
        assert_eq!(renderer.render("t", &json!({})).unwrap(), "[]");
    }

    #[test]
    fn test_malformed_template_is_template_error() {
        let mut renderer = PromptRenderer::new();
        let err = renderer.register("bad", "Risk for {{qualifier").unwrap_err();
        assert!(matches!(err, AppError::Template(_)));
        assert!(!renderer.has("bad"));
    }

    #[test]
    fn test_unknown_template() {
        let renderer = PromptRenderer::new();
        let err = renderer.render("nope", &json!({})).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
