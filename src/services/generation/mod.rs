//! Generation Orchestrator
//!
//! Resolves the placeholder markers of a report document with model output.
//! Two strategies share one provider caller per run:
//!
//! - per-placeholder: one call per marker, in scan order
//! - batch: one composite JSON call plus an optional verify pass
//!
//! Neither strategy fails the run. Placeholders that could not be generated
//! keep their marker and are listed in the run's stats for the fill-defaults
//! and polish passes.

mod batch;
pub mod caller;
pub mod context;
pub mod defaults;
mod per_placeholder;
pub mod providers;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use serde_json::Value;

pub use caller::{CallFailure, CallerCursor, ProviderCaller, DRY_RUN_TEXT};
pub use context::{build_batch_context, build_context, BatchContext, PromptContext};
pub use defaults::{fill_defaults, DefaultedField};
pub use providers::{CallPolicy, ProviderSet};

use crate::models::settings::{AppConfig, GenerationStrategy};
use crate::models::stats::RunStats;
use crate::services::prompts::PromptRegistry;
use crate::utils::error::AppResult;

/// The resolved document and what it took to produce it
#[derive(Debug, Clone)]
pub struct GenerationRun {
    pub document: Value,
    pub stats: RunStats,
    /// Model and provider position plus spacing clock at the end of the run
    pub cursor: CallerCursor,
}

/// Drives marker resolution for one document at a time
#[derive(Debug, Clone)]
pub struct GenerationOrchestrator {
    prompts: Arc<PromptRegistry>,
    providers: Arc<ProviderSet>,
    strategy: GenerationStrategy,
    verify_batch: bool,
}

impl GenerationOrchestrator {
    pub fn new(prompts: Arc<PromptRegistry>, providers: Arc<ProviderSet>) -> Self {
        Self {
            prompts,
            providers,
            strategy: GenerationStrategy::default(),
            verify_batch: true,
        }
    }

    /// Load the prompt registry and build providers from configuration.
    ///
    /// Fails only when the registry cannot be loaded or no provider is
    /// usable.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let prompts = PromptRegistry::load(&config.prompt_registry_path)?;
        let providers = ProviderSet::from_config(config)?;
        Ok(Self::new(Arc::new(prompts), Arc::new(providers))
            .with_strategy(config.strategy)
            .with_verify(config.verify_batch))
    }

    pub fn with_strategy(mut self, strategy: GenerationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_verify(mut self, verify_batch: bool) -> Self {
        self.verify_batch = verify_batch;
        self
    }

    pub fn strategy(&self) -> GenerationStrategy {
        self.strategy
    }

    pub fn prompts(&self) -> &Arc<PromptRegistry> {
        &self.prompts
    }

    pub fn providers(&self) -> &Arc<ProviderSet> {
        &self.providers
    }

    /// Run the configured strategy.
    ///
    /// The batch strategy needs a batch field table; without one the
    /// per-placeholder strategy runs instead.
    pub async fn generate(&self, document: Value) -> GenerationRun {
        match self.strategy {
            GenerationStrategy::Batch if !self.prompts.batch_fields().is_empty() => {
                self.run_batch(document).await
            }
            GenerationStrategy::Batch => {
                tracing::warn!("No batch fields configured, using per-placeholder generation");
                self.run(document).await
            }
            GenerationStrategy::PerPlaceholder => self.run(document).await,
        }
    }
}
