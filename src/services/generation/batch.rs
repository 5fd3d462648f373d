//! Batch Strategy
//!
//! One composite call asks for every pending field as a single JSON object,
//! an optional second call verifies the draft against the source data, and
//! the fixed batch field table maps response keys back onto document paths.

use serde_json::{Map, Value};

use report_narrator_core::{
    document_has_markers, extract_json_value, get_at, scan, set_at, CoreResult, DocumentPath,
};
use report_narrator_llm::GenerateOptions;

use super::caller::{ProviderCaller, DRY_RUN_TEXT};
use super::context::build_batch_context;
use super::per_placeholder::{log_summary, record_dangling, record_violations};
use super::validation::{shape_value, write_resolved};
use super::{GenerationOrchestrator, GenerationRun};
use crate::models::prompt::{BatchField, OutputKind};
use crate::models::stats::{PlaceholderState, RunStats};
use crate::services::prompts::RenderedPrompt;
use crate::utils::error::AppResult;

/// Calls allowed per batch step when the response is not a JSON object
const MAX_PARSE_ATTEMPTS: usize = 2;

const BATCH_PROMPT_ID: &str = "batch";
const VERIFY_PROMPT_ID: &str = "batch_verify";

impl GenerationOrchestrator {
    /// Resolve every pending batch field with one call plus an optional
    /// verify pass.
    ///
    /// When the draft cannot be obtained the input document is returned
    /// unchanged, with every pending field recorded as failed.
    pub async fn run_batch(&self, document: Value) -> GenerationRun {
        let mut stats = RunStats::new();
        record_dangling(&document, &mut stats);

        let pending: Vec<&BatchField> = self
            .prompts
            .batch_fields()
            .iter()
            .filter(|field| is_pending(&document, &field.path))
            .collect();
        tracing::info!(
            run_id = %stats.run_id,
            fields = pending.len(),
            verify = self.verify_batch,
            dry_run = self.providers.is_dry_run(),
            "Starting batch generation"
        );
        let mut caller = self.providers.caller();
        if pending.is_empty() {
            stats.finish();
            return GenerationRun {
                document,
                stats,
                cursor: caller.into_cursor(),
            };
        }

        let response = if self.providers.is_dry_run() {
            dry_run_response(&pending)
        } else {
            match self.generate_batch(&document, &pending, &mut caller, &mut stats).await {
                Some(response) => response,
                None => {
                    for field in &pending {
                        stats.record_outcome(field.path.clone(), &field.key, PlaceholderState::Failed);
                    }
                    stats.finish();
                    log_summary(&stats);
                    return GenerationRun {
                        document,
                        stats,
                        cursor: caller.into_cursor(),
                    };
                }
            }
        };

        let mut resolved = document.clone();
        for field in &pending {
            let state = self.apply_field(&mut resolved, field, response.get(&field.key), &mut stats);
            tracing::debug!(field = %field.key, path = %field.path, state = ?state, "Batch field finished");
            stats.record_outcome(field.path.clone(), &field.key, state);
        }

        stats.finish();
        log_summary(&stats);
        GenerationRun {
            document: resolved,
            stats,
            cursor: caller.into_cursor(),
        }
    }

    /// Draft, then verify when enabled; `None` when no draft was obtained.
    async fn generate_batch(
        &self,
        original: &Value,
        pending: &[&BatchField],
        caller: &mut ProviderCaller<'_>,
        stats: &mut RunStats,
    ) -> Option<Map<String, Value>> {
        let mut context = build_batch_context(original, pending);
        let prompt = self.rendered(self.prompts.render_batch(&context), stats)?;
        let draft = self.call_json(BATCH_PROMPT_ID, &prompt, caller, stats).await?;

        if !self.verify_batch {
            return Some(draft);
        }

        context.draft_json = Some(serde_json::to_string_pretty(&draft).unwrap_or_default());
        let verified = match self.rendered(self.prompts.render_verify(&context), stats) {
            Some(prompt) => self.call_json(VERIFY_PROMPT_ID, &prompt, caller, stats).await,
            None => None,
        };
        match verified {
            Some(mut verified) => {
                // Keep draft values for anything the verify pass dropped or blanked
                for (key, value) in draft {
                    if verified.get(&key).map_or(true, is_blank) {
                        verified.insert(key, value);
                    }
                }
                Some(verified)
            }
            None => {
                tracing::warn!("Verify pass failed, keeping the draft");
                Some(draft)
            }
        }
    }

    fn rendered(&self, prompt: AppResult<RenderedPrompt>, stats: &mut RunStats) -> Option<RenderedPrompt> {
        match prompt {
            Ok(prompt) => Some(prompt),
            Err(err) => {
                tracing::warn!(error = %err, "Batch prompt render failed");
                stats.record_error(format!("batch prompt: {}", err));
                None
            }
        }
    }

    /// One batch step: a JSON object response, with a single retry when the
    /// response does not parse.
    async fn call_json(
        &self,
        prompt_id: &str,
        prompt: &RenderedPrompt,
        caller: &mut ProviderCaller<'_>,
        stats: &mut RunStats,
    ) -> Option<Map<String, Value>> {
        let policy = self.providers.policy();
        let options = GenerateOptions {
            model: None,
            temperature: Some(policy.temperature),
            max_output_tokens: Some(policy.max_output_tokens),
            max_retries: policy.max_retries,
            structured: true,
        };

        for attempt in 1..=MAX_PARSE_ATTEMPTS {
            let generated = match caller
                .generate(prompt_id, &prompt.system, &prompt.user, &options, stats)
                .await
            {
                Ok(generated) => generated,
                Err(failure) => {
                    stats.record_error(format!("{}: {}", prompt_id, failure));
                    return None;
                }
            };

            let parsed = generated
                .structured
                .or_else(|| extract_json_value(&generated.text));
            match parsed {
                Some(Value::Object(map)) => return Some(map),
                _ => {
                    tracing::warn!(
                        prompt = prompt_id,
                        attempt,
                        "Batch response is not a JSON object"
                    );
                }
            }
        }

        stats.record_error(format!(
            "{}: response was not a JSON object after {} attempts",
            prompt_id, MAX_PARSE_ATTEMPTS
        ));
        None
    }

    fn apply_field(
        &self,
        document: &mut Value,
        field: &BatchField,
        value: Option<&Value>,
        stats: &mut RunStats,
    ) -> PlaceholderState {
        let definition = self.prompts.get(&field.key);
        if definition.is_some_and(|d| d.requires_approval) {
            stats.require_approval(field.path.clone());
        }

        let Some(value) = value.cloned().and_then(|v| shape_value(v, field.kind)) else {
            tracing::warn!(field = %field.key, "Field missing from batch response");
            stats.record_error(format!("{}: missing from batch response", field.key));
            return PlaceholderState::Failed;
        };

        let warned = definition
            .map(|d| record_violations(&field.path, &field.key, &value, d, stats))
            .unwrap_or(false);

        match write_field(document, field, value) {
            Ok(_) if warned => PlaceholderState::ValidationFailed,
            Ok(_) => PlaceholderState::Succeeded,
            Err(err) => {
                tracing::warn!(field = %field.key, path = %field.path, error = %err, "Failed to write batch field");
                stats.record_error(format!("{}: {}", field.path, err));
                PlaceholderState::Failed
            }
        }
    }
}

/// A field is pending when its target is absent or still carries marker text.
fn is_pending(document: &Value, path: &DocumentPath) -> bool {
    match get_at(document, path) {
        None | Some(Value::Null) => true,
        Some(value) => document_has_markers(value),
    }
}

/// Write a batch value at its table path.
///
/// Markers at exactly that path are resolved the way the per-placeholder
/// strategy resolves them (substring replacement inside text, array
/// retarget for a singleton array); anything else is replaced outright.
fn write_field(document: &mut Value, field: &BatchField, value: Value) -> CoreResult<DocumentPath> {
    let placeholders: Vec<_> = scan(document)
        .into_iter()
        .filter(|p| p.path == field.path)
        .collect();

    match placeholders.split_first() {
        Some((first, _)) if first.is_whole_value() => write_resolved(document, first, value),
        Some(_) => {
            for placeholder in &placeholders {
                write_resolved(document, placeholder, value.clone())?;
            }
            Ok(field.path.clone())
        }
        None => {
            set_at(document, &field.path, value)?;
            Ok(field.path.clone())
        }
    }
}

/// Null, empty, or whitespace-only
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn dry_run_response(pending: &[&BatchField]) -> Map<String, Value> {
    pending
        .iter()
        .map(|field| {
            let value = match field.kind {
                OutputKind::ArrayOfStrings => Value::Array(vec![Value::String(DRY_RUN_TEXT.to_string())]),
                OutputKind::String | OutputKind::HtmlFragment => Value::String(DRY_RUN_TEXT.to_string()),
            };
            (field.key.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::services::generation::providers::{CallPolicy, ProviderSet};
    use crate::services::generation::testing::{MockProvider, Reply};
    use crate::services::prompts::PromptRegistry;
    use report_narrator_llm::{LlmProvider, ModelDescriptor, ModelRegistry, ModelTier};

    fn registry() -> Arc<PromptRegistry> {
        let json = json!({
            "prompts": {
                "executive_summary": {"user_template": "unused", "requires_approval": true}
            },
            "batch_fields": [
                {"key": "executive_summary", "path": "summary", "description": "Two sentences"},
                {"key": "next_steps", "path": "plan.steps", "kind": "array_of_strings"},
                {"key": "owner_note", "path": "plan.note"}
            ]
        });
        Arc::new(PromptRegistry::from_value(json).unwrap())
    }

    fn orchestrator(provider: Arc<MockProvider>, verify: bool) -> GenerationOrchestrator {
        let models = ModelRegistry::new(vec![ModelDescriptor::new("m1", ModelTier::Standard, 0, 0)]).unwrap();
        let providers: Vec<Arc<dyn LlmProvider>> = vec![provider];
        let set = ProviderSet::new(providers, models, CallPolicy::default(), false).unwrap();
        GenerationOrchestrator::new(registry(), Arc::new(set)).with_verify(verify)
    }

    fn document() -> Value {
        json!({
            "client_name": "Acme",
            "summary": "[MARKER: executive_summary]",
            "plan": {"steps": ["[MARKER: next_steps]"], "note": "Owner: [MARKER: owner_note]."}
        })
    }

    #[tokio::test]
    async fn test_batch_maps_fields_to_paths() {
        let provider = Arc::new(MockProvider::chain(vec![Reply::text(
            r#"{"executive_summary": "Acme is stable.", "next_steps": ["Audit", "Train"], "owner_note": "Ops"}"#,
        )]));
        let run = orchestrator(provider.clone(), false).run_batch(document()).await;

        assert_eq!(run.document["summary"], "Acme is stable.");
        assert_eq!(run.document["plan"]["steps"], json!(["Audit", "Train"]));
        assert_eq!(run.document["plan"]["note"], "Owner: Ops.");
        assert_eq!(run.stats.count_state(PlaceholderState::Succeeded), 3);
        assert_eq!(run.stats.approval_required.len(), 1);
        assert_eq!(provider.call_count(), 1);
        assert!(provider.calls()[0].user.contains("\"client_name\": \"Acme\""));
    }

    #[tokio::test]
    async fn test_verify_pass_uses_draft() {
        let provider = Arc::new(MockProvider::chain(vec![
            Reply::text(r#"{"executive_summary": "Draft.", "next_steps": ["A"], "owner_note": "Ops"}"#),
            Reply::text(r#"{"executive_summary": "Verified."}"#),
        ]));
        let run = orchestrator(provider.clone(), true).run_batch(document()).await;

        assert_eq!(provider.call_count(), 2);
        assert!(provider.calls()[1].user.contains("Draft."));
        assert_eq!(run.document["summary"], "Verified.");
        assert_eq!(run.document["plan"]["steps"], json!(["A"]));
    }

    #[tokio::test]
    async fn test_verify_blanks_fall_back_to_draft() {
        let provider = Arc::new(MockProvider::chain(vec![
            Reply::text(r#"{"executive_summary": "Draft.", "next_steps": ["A"], "owner_note": "Ops"}"#),
            Reply::text(r#"{"executive_summary": null, "next_steps": [], "owner_note": "  "}"#),
        ]));
        let run = orchestrator(provider.clone(), true).run_batch(document()).await;

        assert_eq!(provider.call_count(), 2);
        assert_eq!(run.document["summary"], "Draft.");
        assert_eq!(run.document["plan"]["steps"], json!(["A"]));
        assert_eq!(run.document["plan"]["note"], "Owner: Ops.");
        assert_eq!(run.stats.count_state(PlaceholderState::Succeeded), 3);
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(&Value::Null));
        assert!(is_blank(&json!(" ")));
        assert!(is_blank(&json!([])));
        assert!(!is_blank(&json!("text")));
        assert!(!is_blank(&json!(0)));
    }

    #[tokio::test]
    async fn test_failed_verify_keeps_draft() {
        let provider = Arc::new(MockProvider::chain(vec![
            Reply::text(r#"{"executive_summary": "Draft.", "next_steps": ["A"], "owner_note": "Ops"}"#),
            Reply::text("not json"),
            Reply::text("still not json"),
        ]));
        let run = orchestrator(provider.clone(), true).run_batch(document()).await;

        assert_eq!(provider.call_count(), 3);
        assert_eq!(run.document["summary"], "Draft.");
    }

    #[tokio::test]
    async fn test_unparseable_draft_returns_input() {
        let provider = Arc::new(MockProvider::chain(vec![
            Reply::text("Here is your report!"),
            Reply::text("Sorry, try again"),
        ]));
        let input = document();
        let run = orchestrator(provider.clone(), true).run_batch(input.clone()).await;

        assert_eq!(provider.call_count(), 2);
        assert_eq!(run.document, input);
        assert_eq!(run.stats.count_state(PlaceholderState::Failed), 3);
    }

    #[tokio::test]
    async fn test_missing_key_leaves_marker() {
        let provider = Arc::new(MockProvider::chain(vec![Reply::text(
            r#"{"executive_summary": "Fine.", "next_steps": ["A"]}"#,
        )]));
        let run = orchestrator(provider, false).run_batch(document()).await;
        assert_eq!(run.document["plan"]["note"], "Owner: [MARKER: owner_note].");
        assert_eq!(run.stats.count_state(PlaceholderState::Failed), 1);
    }

    #[tokio::test]
    async fn test_resolved_fields_are_not_requested() {
        let provider = Arc::new(MockProvider::chain(Vec::new()));
        let doc = json!({"summary": "Done.", "plan": {"steps": ["A"], "note": "Owner: Ops."}});
        let run = orchestrator(provider.clone(), true).run_batch(doc.clone()).await;
        assert_eq!(provider.call_count(), 0);
        assert_eq!(run.document, doc);
    }

    #[tokio::test]
    async fn test_dry_run_batch() {
        let models = ModelRegistry::new(vec![ModelDescriptor::new("m1", ModelTier::Standard, 0, 0)]).unwrap();
        let set = ProviderSet::new(Vec::new(), models, CallPolicy::default(), true).unwrap();
        let orchestrator = GenerationOrchestrator::new(registry(), Arc::new(set));
        let run = orchestrator.run_batch(document()).await;

        assert_eq!(run.document["summary"], DRY_RUN_TEXT);
        assert_eq!(run.document["plan"]["steps"], json!([DRY_RUN_TEXT]));
        assert_eq!(run.document["plan"]["note"], format!("Owner: {}.", DRY_RUN_TEXT));
        assert_eq!(run.stats.api_calls, 0);
    }

    #[test]
    fn test_is_pending() {
        let doc = json!({"a": "done", "b": ["[MARKER: x]"], "c": null});
        assert!(!is_pending(&doc, &DocumentPath::parse("a").unwrap()));
        assert!(is_pending(&doc, &DocumentPath::parse("b").unwrap()));
        assert!(is_pending(&doc, &DocumentPath::parse("c").unwrap()));
        assert!(is_pending(&doc, &DocumentPath::parse("missing.path").unwrap()));
    }
}
