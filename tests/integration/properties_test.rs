//! Behavioral properties of generation and polishing
//!
//! - no marker text survives generation followed by polishing
//! - the model cursor never moves back up the chain
//! - array values for singleton marker arrays replace the parent array
//! - deterministic polishing is idempotent
//! - calls to one model are spaced by its minimum delay

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use report_narrator::services::generation::CallPolicy;
use report_narrator::services::pipeline::{JsonRenderer, ReportRenderer};
use report_narrator::services::polish::{polish_deterministic, OutputPolisher, NO_CHANGES};
use report_narrator_core::{array_write_target, contains_marker_text, get_at, scan, set_at, DocumentPath};

use super::support::{
    assessment, chain, fatal, orchestrator, policy, rate_limited, text, ScriptedProvider,
};

fn path(raw: &str) -> DocumentPath {
    DocumentPath::parse(raw).unwrap()
}

// ============================================================================
// No marker survives
// ============================================================================

async fn generate_and_polish(document: Value, provider: Arc<ScriptedProvider>) -> String {
    let run = orchestrator(provider, chain(&[0]), policy()).run(document).await;
    let rendered = JsonRenderer.render(&run.document).unwrap();
    OutputPolisher::deterministic().polish(&rendered).await.text
}

#[tokio::test]
async fn test_no_markers_after_polish_when_generation_fails() {
    let provider = Arc::new(ScriptedProvider::with_fallback(Vec::new(), fatal()));
    let output = generate_and_polish(assessment(), provider).await;
    assert!(!contains_marker_text(&output), "{}", output);
    assert!(output.contains("Acme Logistics"));
}

#[tokio::test]
async fn test_no_markers_after_polish_with_partial_success() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        text("Acme Operations Review"),
        fatal(),
        text("Breach risk is high."),
    ]));
    let mut document = assessment();
    document["notes"] = json!([
        "Unknown field: [MARKER: appendix_note]",
        "Truncated upstream: [MARKER: closing_remarks"
    ]);

    let output = generate_and_polish(document, provider).await;
    assert!(!contains_marker_text(&output), "{}", output);
    assert!(output.contains("Acme Operations Review"));
}

#[tokio::test]
async fn test_no_markers_in_documents_of_any_shape() {
    let documents = [
        json!("[MARKER: summary]"),
        json!(["[MARKER: risk for A]", ["[MARKER: title]"], {"x": "[MARKER: metric]"}]),
        json!({"deep": {"deeper": {"deepest": "pre [MARKER: impact] post [MARKER: action]"}}}),
        json!({"empty": [], "none": null, "n": 1.5}),
    ];
    for document in documents {
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let output = generate_and_polish(document, provider).await;
        assert!(!contains_marker_text(&output), "{}", output);
    }
}

// ============================================================================
// Fallback monotonicity
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_model_cursor_only_moves_down() {
    let provider = Arc::new(ScriptedProvider::with_fallback(
        vec![
            rate_limited(),
            text("Acme Operations Review"),
            text("Summary."),
            rate_limited(),
            text("Risk X."),
        ],
        text("Later output."),
    ));
    let orchestrator = orchestrator(provider.clone(), chain(&[0, 0, 0]), policy());

    let run = orchestrator.run(assessment()).await;

    let ranks: Vec<usize> = provider
        .calls()
        .iter()
        .map(|(model, _)| model.trim_start_matches("model-").parse().unwrap())
        .collect();
    assert!(ranks.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", ranks);
    assert_eq!(ranks.first(), Some(&1));
    assert_eq!(ranks.last(), Some(&3));
    // model-1 is never called again once abandoned
    assert_eq!(ranks.iter().filter(|rank| **rank == 1).count(), 1);
    assert_eq!(run.stats.fallback_transitions.len(), 2);
}

// ============================================================================
// Array retarget
// ============================================================================

#[test]
fn test_singleton_marker_array_is_replaced() {
    let mut document = json!({"a": {"b": ["[MARKER: next_steps]"]}});
    let placeholder = scan(&document).remove(0);
    assert_eq!(placeholder.path, path("a.b[0]"));

    let value = json!(["one", "two", "three"]);
    let target = array_write_target(&document, &placeholder, &value);
    set_at(&mut document, &target, value).unwrap();

    assert_eq!(get_at(&document, &path("a.b")), Some(&json!(["one", "two", "three"])));
    assert_eq!(get_at(&document, &path("a.b[0]")), Some(&json!("one")));
}

#[tokio::test]
async fn test_orchestrator_applies_array_retarget() {
    let provider = Arc::new(ScriptedProvider::new(vec![text("- one\n- two\n- three")]));
    let run = orchestrator(provider, chain(&[0]), policy())
        .run(json!({"a": {"b": ["[MARKER: next_steps]"]}}))
        .await;
    assert_eq!(run.document["a"]["b"], json!(["one", "two", "three"]));
}

// ============================================================================
// Idempotent polish
// ============================================================================

#[test]
fn test_polish_twice_changes_nothing() {
    let inputs = [
        "",
        "Already clean.",
        "```html\n<p>Risk: [MARKER: risk for Ops]</p>\n```",
        "Growth of [X] for [Client Name]..  [INSUFFICIENT_EVIDENCE]",
        "Total ,   fine .\n\n\n\n\nNext",
        "Dangling [MARKER: summary of the",
        "Wait... what?? ok!!!",
        "{\n  \"title\": \"[MARKER: title]\",\n  \"rows\": [\n    \"[specific data point]\"\n  ]\n}",
        "- [x] Filed under ../archive/2024.. done",
    ];
    let nested = format!("Value {}x{}.", "[insert ".repeat(12), "]".repeat(12));
    let inputs = inputs.iter().copied().chain(std::iter::once(nested.as_str()));
    for input in inputs {
        let first = polish_deterministic(input);
        let second = polish_deterministic(&first.text);
        assert_eq!(second.text, first.text, "input: {:?}", input);
        assert_eq!(second.change_log.len(), 1, "input: {:?}", input);
        assert_eq!(second.change_log[0].kind, NO_CHANGES);
    }
}

// ============================================================================
// Rate-limit spacing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_calls_to_one_model_are_spaced() {
    let provider = Arc::new(ScriptedProvider::with_fallback(Vec::new(), text("Generated.")));
    let orchestrator = orchestrator(provider.clone(), chain(&[2_000]), policy());

    orchestrator.run(assessment()).await;

    let calls = provider.calls();
    assert_eq!(calls.len(), 5);
    for pair in calls.windows(2) {
        let gap = pair[1].1 - pair[0].1;
        assert!(gap >= Duration::from_millis(2_000), "gap {:?}", gap);
    }
}

#[tokio::test(start_paused = true)]
async fn test_paid_tier_skips_spacing() {
    let provider = Arc::new(ScriptedProvider::with_fallback(Vec::new(), text("Generated.")));
    let paid = CallPolicy {
        paid_tier: true,
        ..policy()
    };
    let orchestrator = orchestrator(provider.clone(), chain(&[2_000]), paid);

    orchestrator.run(assessment()).await;

    let calls = provider.calls();
    let total = calls[calls.len() - 1].1 - calls[0].1;
    assert!(total < Duration::from_millis(2_000));
}
