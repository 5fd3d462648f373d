//! Configuration-driven pipeline runs
//!
//! Loads a config and prompt registry from disk and runs the full
//! generate, default, render, polish pipeline in dry-run mode.

use std::fs;
use std::path::Path;

use serde_json::json;
use tempfile::TempDir;

use report_narrator::models::settings::GenerationStrategy;
use report_narrator::services::generation::DRY_RUN_TEXT;
use report_narrator::storage::config::ConfigService;
use report_narrator::ReportPipeline;
use report_narrator_core::contains_marker_text;

use super::support::assessment;

fn write_fixture(dir: &Path, strategy: &str) -> std::path::PathBuf {
    let prompts = json!({
        "prompts": {
            "title": {"user_template": "Write a title for {{document_title}}."},
            "risk": {"user_template": "Risk for {{qualifier}}.", "requires_approval": true},
            "executive_summary": {"user_template": "Summarize."}
        },
        "batch_fields": [
            {"key": "executive_summary", "path": "summary"},
            {"key": "next_steps", "path": "plan.steps", "kind": "array_of_strings"}
        ]
    });
    let prompts_path = dir.join("prompts.json");
    fs::write(&prompts_path, serde_json::to_string_pretty(&prompts).unwrap()).unwrap();

    let config = json!({
        "dry_run": true,
        "strategy": strategy,
        "prompt_registry_path": prompts_path.to_string_lossy(),
        "polish": {"model_pass": false}
    });
    let config_path = dir.join("report-narrator.json");
    fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    config_path
}

#[tokio::test]
async fn test_per_placeholder_pipeline_from_config() {
    let dir = TempDir::new().unwrap();
    let service = ConfigService::load(write_fixture(dir.path(), "per_placeholder")).unwrap();
    assert_eq!(service.get_config().strategy, GenerationStrategy::PerPlaceholder);

    let pipeline = ReportPipeline::from_config(service.get_config()).unwrap();
    let output = pipeline.run(assessment()).await.unwrap();

    assert_eq!(output.document["title"], DRY_RUN_TEXT);
    assert_eq!(output.document["scorecard"][1]["risk"], DRY_RUN_TEXT);
    // next_steps has no prompt, so the defaults pass fills it
    assert_eq!(output.defaulted.len(), 1);
    assert_eq!(output.defaulted[0].field_name, "next_steps");
    assert_eq!(output.stats.api_calls, 0);
    assert_eq!(output.stats.approval_required.len(), 2);
    assert!(output.stats.finished_at.is_some());
    assert!(!contains_marker_text(&output.output));
}

#[tokio::test]
async fn test_batch_pipeline_from_config() {
    let dir = TempDir::new().unwrap();
    let service = ConfigService::load(write_fixture(dir.path(), "batch")).unwrap();

    let pipeline = ReportPipeline::from_config(service.get_config()).unwrap();
    let output = pipeline.run(assessment()).await.unwrap();

    assert_eq!(output.document["summary"], DRY_RUN_TEXT);
    assert_eq!(output.document["plan"]["steps"], json!([DRY_RUN_TEXT]));
    // title and risks sit outside the batch table
    assert_eq!(output.defaulted.len(), 3);
    assert!(!contains_marker_text(&output.output));
}

#[test]
fn test_missing_registry_fails_pipeline_construction() {
    let dir = TempDir::new().unwrap();
    let config_path = write_fixture(dir.path(), "per_placeholder");
    fs::remove_file(dir.path().join("prompts.json")).unwrap();

    let service = ConfigService::load(config_path).unwrap();
    assert!(ReportPipeline::from_config(service.get_config()).is_err());
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("report-narrator.json");
    fs::write(&config_path, r#"{"temperature": 5.0}"#).unwrap();
    assert!(ConfigService::load(config_path).is_err());
}
