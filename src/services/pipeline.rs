//! Report Pipeline
//!
//! Wires generation into the surrounding stages: an optional transform that
//! produces the marker document, generation, the fill-defaults pass, a
//! renderer, and the polisher.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::generation::{fill_defaults, DefaultedField, GenerationOrchestrator};
use super::polish::{ChangeLogEntry, OutputPolisher};
use crate::models::settings::AppConfig;
use crate::models::stats::RunStats;
use crate::utils::error::AppResult;

/// Produces the marker document from source data
#[async_trait]
pub trait DocumentTransform: Send + Sync {
    async fn transform(&self, input: Value) -> AppResult<Value>;
}

/// Turns the resolved document into the deliverable text
pub trait ReportRenderer: Send + Sync {
    fn render(&self, document: &Value) -> AppResult<String>;
}

/// Renders the document as pretty-printed JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl ReportRenderer for JsonRenderer {
    fn render(&self, document: &Value) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(document)?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    /// Resolved document after the fill-defaults pass
    pub document: Value,
    /// Rendered and polished text
    pub output: String,
    pub stats: RunStats,
    pub change_log: Vec<ChangeLogEntry>,
    pub defaulted: Vec<DefaultedField>,
}

pub struct ReportPipeline {
    transform: Option<Arc<dyn DocumentTransform>>,
    orchestrator: GenerationOrchestrator,
    renderer: Arc<dyn ReportRenderer>,
    polisher: OutputPolisher,
}

impl ReportPipeline {
    pub fn new(orchestrator: GenerationOrchestrator, polisher: OutputPolisher) -> Self {
        Self {
            transform: None,
            orchestrator,
            renderer: Arc::new(JsonRenderer),
            polisher,
        }
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let orchestrator = GenerationOrchestrator::from_config(config)?;
        let polisher = OutputPolisher::new(orchestrator.providers().clone(), config.polish.clone());
        Ok(Self::new(orchestrator, polisher))
    }

    pub fn with_transform(mut self, transform: Arc<dyn DocumentTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ReportRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Generate, default, render, and polish one report.
    ///
    /// Only the transform and renderer can fail; generation problems end up
    /// in the stats and the change log.
    pub async fn run(&self, input: Value) -> AppResult<PipelineOutput> {
        let document = match &self.transform {
            Some(transform) => transform.transform(input).await?,
            None => input,
        };

        let run = self.orchestrator.generate(document).await;
        let mut document = run.document;
        let mut stats = run.stats;
        let mut cursor = run.cursor;

        let defaulted = fill_defaults(&mut document);
        let rendered = self.renderer.render(&document)?;
        let polished = self
            .polisher
            .polish_tracked(&rendered, &mut stats, &mut cursor)
            .await;
        stats.finish();

        tracing::info!(
            run_id = %stats.run_id,
            defaulted = defaulted.len(),
            polish_changes = polished.change_log.len(),
            approval_required = stats.approval_required.len(),
            "Report pipeline finished"
        );

        Ok(PipelineOutput {
            document,
            output: polished.text,
            stats,
            change_log: polished.change_log,
            defaulted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::PolishSettings;
    use crate::services::generation::testing::{MockProvider, Reply};
    use crate::services::generation::{CallPolicy, ProviderSet, DRY_RUN_TEXT};
    use crate::services::prompts::PromptRegistry;
    use crate::utils::error::AppError;
    use report_narrator_core::contains_marker_text;
    use report_narrator_llm::{LlmProvider, ModelDescriptor, ModelRegistry, ModelTier};
    use serde_json::json;
    use std::time::Duration;

    struct WrapTransform;

    #[async_trait]
    impl DocumentTransform for WrapTransform {
        async fn transform(&self, input: Value) -> AppResult<Value> {
            let client = input
                .get("client")
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::validation("missing client"))?;
            Ok(json!({
                "client_name": client,
                "title": "[MARKER: title]",
                "appendix": "[MARKER: appendix_note]"
            }))
        }
    }

    fn pipeline() -> ReportPipeline {
        let prompts = PromptRegistry::from_value(json!({"prompts": {"title": {"user_template": "t"}}})).unwrap();
        let set = ProviderSet::new(Vec::new(), ModelRegistry::default(), CallPolicy::default(), true).unwrap();
        let orchestrator = GenerationOrchestrator::new(Arc::new(prompts), Arc::new(set));
        ReportPipeline::new(orchestrator, OutputPolisher::deterministic())
    }

    #[tokio::test]
    async fn test_pipeline_defaults_skipped_fields() {
        let output = pipeline()
            .with_transform(Arc::new(WrapTransform))
            .run(json!({"client": "Acme"}))
            .await
            .unwrap();

        assert_eq!(output.document["title"], DRY_RUN_TEXT);
        assert_eq!(output.defaulted.len(), 1);
        assert_eq!(output.defaulted[0].field_name, "appendix_note");
        assert!(!contains_marker_text(&output.output));
        assert!(output.output.contains("\"client_name\": \"Acme\""));
    }

    #[tokio::test]
    async fn test_transform_error_propagates() {
        let result = pipeline()
            .with_transform(Arc::new(WrapTransform))
            .run(json!({}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polish_continues_from_run_cursor() {
        let mock = Arc::new(MockProvider::chain(vec![
            Reply::rate_limited(),
            Reply::text("Report Title"),
            Reply::text("{\n  \"title\": \"Report Title\"\n}"),
        ]));
        let models = ModelRegistry::new(vec![
            ModelDescriptor::new("m1", ModelTier::Premium, 0, 0),
            ModelDescriptor::new("m2", ModelTier::Standard, 1_500, 0),
        ])
        .unwrap();
        let providers: Vec<Arc<dyn LlmProvider>> = vec![mock.clone()];
        let set = Arc::new(ProviderSet::new(providers, models, CallPolicy::default(), false).unwrap());
        let prompts = PromptRegistry::from_value(json!({"prompts": {"title": {"user_template": "t"}}})).unwrap();
        let orchestrator = GenerationOrchestrator::new(Arc::new(prompts), set.clone());
        let polisher = OutputPolisher::new(set, PolishSettings::default());

        let output = ReportPipeline::new(orchestrator, polisher)
            .run(json!({"title": "[MARKER: title]"}))
            .await
            .unwrap();

        let calls = mock.calls();
        let models: Vec<&str> = calls.iter().filter_map(|c| c.model.as_deref()).collect();
        assert_eq!(models, vec!["m1", "m2", "m2"]);
        // The polish call waits out m2's spacing from the title call
        assert!(calls[2].at - calls[1].at >= Duration::from_millis(1_500));
        assert_eq!(output.document["title"], "Report Title");
        assert_eq!(output.stats.attempts.len(), 3);
    }
}
