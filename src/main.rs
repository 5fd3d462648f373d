// Report Narrator - command line entry point
//
// Usage: report-narrator <document.json> [output]
//
// Configuration is read from $REPORT_NARRATOR_CONFIG (default
// report-narrator.json) plus environment overrides. The polished report is
// written to `output`, or stdout when omitted.

use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use report_narrator::services::pipeline::ReportPipeline;
use report_narrator::storage::config::ConfigService;
use report_narrator::utils::error::{AppError, AppResult};

#[tokio::main]
async fn main() -> ExitCode {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("report_narrator=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Report generation failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> AppResult<()> {
    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| AppError::validation("usage: report-narrator <document.json> [output]"))?;
    let output = args.next().map(PathBuf::from);

    let config = ConfigService::from_env()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config.config_path().display(),
        "Report Narrator starting"
    );

    let content = tokio::fs::read_to_string(&input).await?;
    let document: serde_json::Value = serde_json::from_str(&content)?;

    let pipeline = ReportPipeline::from_config(config.get_config())?;
    let result = pipeline.run(document).await?;

    match &output {
        Some(path) => tokio::fs::write(path, &result.output).await?,
        None => println!("{}", result.output),
    }

    let stats = &result.stats;
    tracing::info!(
        api_calls = stats.api_calls,
        successful_calls = stats.successful_calls,
        tokens = stats.tokens.total_tokens(),
        fallbacks = stats.fallback_transitions.len(),
        defaulted = result.defaulted.len(),
        errors = stats.errors.len(),
        "Run summary"
    );
    for path in &stats.approval_required {
        tracing::warn!(path = %path, "Field requires approval before delivery");
    }
    for field in stats.degraded_fields() {
        tracing::warn!(path = %field.path, field = %field.field_name, state = ?field.state, "Field degraded");
    }

    Ok(())
}
