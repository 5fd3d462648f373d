//! Report Narrator
//!
//! Fills the narrative placeholders of a structured business report with
//! model-generated text. It includes:
//! - Configuration loading with environment overrides
//! - The prompt registry and handlebars rendering
//! - The generation orchestrator (per-placeholder and batch strategies)
//! - The fill-defaults pass and the output polisher

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use models::settings::{AppConfig, GenerationStrategy, SettingsUpdate};
pub use models::stats::RunStats;
pub use services::{GenerationOrchestrator, OutputPolisher, PromptRegistry, ReportPipeline};
pub use utils::error::{AppError, AppResult};
