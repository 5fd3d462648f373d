//! Per-Placeholder Strategy
//!
//! Resolves placeholders one at a time in scan order. Every placeholder's
//! prompt is built from the document as it was before generation started;
//! a failed placeholder keeps its marker and the run moves on.

use serde_json::Value;

use report_narrator_core::{find_dangling_markers, scan, DocumentPath, Placeholder};
use report_narrator_llm::GenerateOptions;

use super::caller::{CallFailure, ProviderCaller};
use super::context::build_context;
use super::validation::{shape_output, validate_output, write_resolved};
use super::{GenerationOrchestrator, GenerationRun};
use crate::models::prompt::PromptDefinition;
use crate::models::stats::{ConstraintWarning, PlaceholderState, RunStats};

impl GenerationOrchestrator {
    /// Resolve every placeholder with its own generation call.
    pub async fn run(&self, document: Value) -> GenerationRun {
        let mut stats = RunStats::new();
        let original = document;
        let mut document = original.clone();

        record_dangling(&original, &mut stats);
        let placeholders = scan(&original);
        tracing::info!(
            run_id = %stats.run_id,
            placeholders = placeholders.len(),
            dry_run = self.providers.is_dry_run(),
            "Starting per-placeholder generation"
        );

        let mut caller = self.providers.caller();
        for placeholder in &placeholders {
            let state = self
                .resolve(&original, &mut document, placeholder, &mut caller, &mut stats)
                .await;
            tracing::debug!(
                path = %placeholder.path,
                field = %placeholder.field_name,
                state = ?state,
                "Placeholder finished"
            );
            stats.record_outcome(placeholder.path.clone(), &placeholder.field_name, state);
        }

        stats.finish();
        log_summary(&stats);
        GenerationRun {
            document,
            stats,
            cursor: caller.into_cursor(),
        }
    }

    async fn resolve(
        &self,
        original: &Value,
        document: &mut Value,
        placeholder: &Placeholder,
        caller: &mut ProviderCaller<'_>,
        stats: &mut RunStats,
    ) -> PlaceholderState {
        let Some(definition) = self.prompts.get(&placeholder.field_name) else {
            tracing::warn!(
                field = %placeholder.field_name,
                path = %placeholder.path,
                "No prompt definition for field, skipping"
            );
            return PlaceholderState::Skipped;
        };
        if definition.requires_approval {
            stats.require_approval(placeholder.path.clone());
        }

        let context = build_context(original, placeholder);
        let prompt = match self.prompts.render(&definition.id, &context) {
            Ok(prompt) => prompt,
            Err(err) => {
                tracing::warn!(prompt = %definition.id, error = %err, "Prompt render failed");
                stats.record_error(format!("{}: {}", placeholder.path, err));
                return PlaceholderState::Failed;
            }
        };

        let options = self.options_for(definition);
        let generated = match caller
            .generate(&definition.id, &prompt.system, &prompt.user, &options, stats)
            .await
        {
            Ok(generated) => generated,
            Err(failure) => {
                stats.record_error(format!("{}: {}", placeholder.path, failure));
                return match failure {
                    CallFailure::Exhausted(_) => PlaceholderState::Exhausted,
                    CallFailure::Fatal(_) => PlaceholderState::Failed,
                };
            }
        };

        let Some(value) = shape_output(&generated, definition.output_kind) else {
            tracing::warn!(field = %placeholder.field_name, "Model returned empty output");
            stats.record_error(format!("{}: empty output", placeholder.path));
            return PlaceholderState::Failed;
        };

        let warned = record_violations(
            &placeholder.path,
            &placeholder.field_name,
            &value,
            definition,
            stats,
        );
        match write_resolved(document, placeholder, value) {
            Ok(target) => {
                tracing::debug!(path = %target, field = %placeholder.field_name, "Value written");
                if warned {
                    PlaceholderState::ValidationFailed
                } else {
                    PlaceholderState::Succeeded
                }
            }
            Err(err) => {
                tracing::warn!(path = %placeholder.path, error = %err, "Failed to write value");
                stats.record_error(format!("{}: {}", placeholder.path, err));
                PlaceholderState::Failed
            }
        }
    }

    /// Sampling options for one prompt
    pub(crate) fn options_for(&self, definition: &PromptDefinition) -> GenerateOptions {
        let policy = self.providers.policy();
        GenerateOptions {
            model: None,
            temperature: Some(policy.temperature),
            max_output_tokens: Some(definition.max_output_size.unwrap_or(policy.max_output_tokens)),
            max_retries: policy.max_retries,
            structured: definition.output_kind.is_array(),
        }
    }
}

/// Log constraint violations; returns whether there were any.
pub(crate) fn record_violations(
    path: &DocumentPath,
    field_name: &str,
    value: &Value,
    definition: &PromptDefinition,
    stats: &mut RunStats,
) -> bool {
    let violations = validate_output(value, definition);
    for message in &violations {
        tracing::warn!(
            field = %field_name,
            path = %path,
            violation = %message,
            "Output violates prompt constraints"
        );
        stats.constraint_warnings.push(ConstraintWarning {
            path: path.clone(),
            field_name: field_name.to_string(),
            message: message.clone(),
        });
    }
    !violations.is_empty()
}

pub(crate) fn record_dangling(document: &Value, stats: &mut RunStats) {
    let dangling = find_dangling_markers(document);
    for marker in &dangling {
        tracing::warn!(path = %marker.path, fragment = %marker.fragment, "Truncated marker in document");
    }
    stats.dangling_markers.extend(dangling);
}

pub(crate) fn log_summary(stats: &RunStats) {
    tracing::info!(
        run_id = %stats.run_id,
        api_calls = stats.api_calls,
        successful_calls = stats.successful_calls,
        tokens = stats.tokens.total_tokens(),
        transitions = stats.fallback_transitions.len(),
        succeeded = stats.count_state(PlaceholderState::Succeeded),
        degraded = stats.degraded_fields().len(),
        approval_required = stats.approval_required.len(),
        "Generation finished"
    );
}
