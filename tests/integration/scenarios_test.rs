//! End-to-end generation scenarios
//!
//! Two-placeholder resolution, rate-limit degradation down the model chain,
//! an unparseable batch response, and polishing without a reachable model.

use std::sync::Arc;

use serde_json::json;
use tokio::time::Instant;

use report_narrator::models::stats::{PlaceholderState, TransitionKind};
use report_narrator::services::generation::{CallPolicy, ProviderSet};
use report_narrator::services::polish::{default_sentence, OutputPolisher};
use report_narrator::models::settings::PolishSettings;
use report_narrator_llm::LlmProvider;

use super::support::{
    assessment, chain, fatal, orchestrator, policy, rate_limited, text, ScriptedProvider,
};

// ============================================================================
// Per-placeholder resolution
// ============================================================================

#[tokio::test]
async fn test_two_placeholders_resolved() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        text("Report Title"),
        text("High risk of SLA breach."),
    ]));
    let orchestrator = orchestrator(provider.clone(), chain(&[0]), policy());
    let document = json!({
        "title": "[MARKER: title]",
        "scorecard": [{"category": "CategoryX", "status": "red", "risk": "[MARKER: risk for CategoryX]"}]
    });

    let run = orchestrator.run(document).await;

    assert_eq!(run.document["title"], "Report Title");
    assert_eq!(run.document["scorecard"][0]["risk"], "High risk of SLA breach.");
    assert_eq!(run.stats.api_calls, 2);
    assert_eq!(run.stats.tokens.total_tokens(), 60);
    assert_eq!(run.stats.count_state(PlaceholderState::Succeeded), 2);
    assert_eq!(run.stats.approval_required.len(), 1);
    assert_eq!(run.stats.approval_required[0].to_string(), "scorecard[0].risk");
}

// ============================================================================
// Rate-limit degradation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_rate_limits_walk_chain_then_wait() {
    let provider = Arc::new(ScriptedProvider::with_fallback(Vec::new(), rate_limited()));
    let orchestrator = orchestrator(provider.clone(), chain(&[0, 0, 0]), policy());
    let started = Instant::now();

    let run = orchestrator.run(json!({"title": "[MARKER: title]"})).await;

    assert_eq!(run.stats.transitions_of(TransitionKind::Model), 2);
    assert!(run.stats.rate_limit_waits >= 1);
    assert!(started.elapsed().as_millis() >= 1_000);

    // Three chain models, then one retry per allowed wait on the last model
    let models: Vec<String> = provider.calls().into_iter().map(|(model, _)| model).collect();
    assert_eq!(
        models,
        vec!["model-1", "model-2", "model-3", "model-3", "model-3"]
    );
    assert_eq!(run.stats.count_state(PlaceholderState::Exhausted), 1);
    assert_eq!(run.document["title"], "[MARKER: title]");
}

#[tokio::test(start_paused = true)]
async fn test_rate_limits_recover_after_wait() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        rate_limited(),
        rate_limited(),
        rate_limited(),
        text("Report Title"),
    ]));
    let orchestrator = orchestrator(provider.clone(), chain(&[0, 0, 0]), policy());

    let run = orchestrator.run(json!({"title": "[MARKER: title]"})).await;

    assert_eq!(run.stats.transitions_of(TransitionKind::Model), 2);
    assert_eq!(run.stats.rate_limit_waits, 1);
    assert_eq!(run.document["title"], "Report Title");
    assert_eq!(run.stats.api_calls, 4);
    assert_eq!(run.stats.successful_calls, 1);
}

// ============================================================================
// Batch parse failure
// ============================================================================

#[tokio::test]
async fn test_batch_unparseable_response_returns_input() {
    let provider = Arc::new(ScriptedProvider::with_fallback(
        Vec::new(),
        text("Sure! Here is the summary you asked for."),
    ));
    let orchestrator = orchestrator(provider.clone(), chain(&[0]), policy());
    let input = assessment();

    let run = orchestrator.run_batch(input.clone()).await;

    assert_eq!(provider.call_count(), 2);
    assert_eq!(run.document, input);
    assert_eq!(run.stats.count_state(PlaceholderState::Failed), 2);
    assert!(!run.stats.errors.is_empty());
}

#[tokio::test]
async fn test_batch_resolves_table_fields() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        text(r#"```json
{"executive_summary": "Acme is on track.", "next_steps": ["Renegotiate SLAs", "Add on-call rota"]}
```"#),
        text(r#"{"executive_summary": "Acme is on track overall.", "next_steps": ["Renegotiate SLAs", "Add on-call rota"]}"#),
    ]));
    let orchestrator = orchestrator(provider.clone(), chain(&[0]), policy());

    let run = orchestrator.run_batch(assessment()).await;

    assert_eq!(provider.call_count(), 2);
    assert_eq!(run.document["summary"], "Acme is on track overall.");
    assert_eq!(
        run.document["plan"]["steps"],
        json!(["Renegotiate SLAs", "Add on-call rota"])
    );
    // Fields outside the table are left for the defaults pass
    assert_eq!(run.document["title"], "[MARKER: title]");
}

// ============================================================================
// Polishing without a reachable model
// ============================================================================

#[tokio::test]
async fn test_polish_falls_back_to_defaults() {
    let provider = Arc::new(ScriptedProvider::with_fallback(Vec::new(), fatal()));
    let providers: Vec<Arc<dyn LlmProvider>> = vec![provider.clone()];
    let set = ProviderSet::new(providers, chain(&[0]), CallPolicy::default(), false).unwrap();
    let polisher = OutputPolisher::new(Arc::new(set), PolishSettings::default());

    let result = polisher
        .polish("Value: [MARKER: finding_summary]. Risk: [MARKER: finding_risk].")
        .await;

    assert_eq!(provider.call_count(), 1);
    assert_eq!(result.change_log.len(), 1);
    assert_eq!(result.change_log[0].kind, "fix_placeholders");
    assert_eq!(result.change_log[0].count, 2);

    let summary = default_sentence("finding_summary");
    let risk = default_sentence("finding_risk");
    assert_ne!(summary, risk);
    assert!(result.text.contains(summary.trim_end_matches('.')));
    assert!(result.text.contains(risk.trim_end_matches('.')));
    assert!(!result.text.contains("[MARKER"));
}
