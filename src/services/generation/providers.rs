//! Provider Set
//!
//! The ordered provider list for a run (primary first, then secondaries),
//! the ranked model chain, and the call policy derived from configuration.

use std::sync::Arc;
use std::time::Duration;

use report_narrator_llm::{
    AnthropicProvider, GeminiProvider, LlmProvider, ModelRegistry, OpenAIProvider, ProviderConfig,
    ProviderType,
};

use super::caller::{CallerCursor, ProviderCaller};
use crate::models::settings::AppConfig;
use crate::utils::error::{AppError, AppResult};

/// Retry, spacing, and sampling knobs shared by every call in a run
#[derive(Debug, Clone, PartialEq)]
pub struct CallPolicy {
    pub paid_tier: bool,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub rate_limit_wait: Duration,
    pub max_rate_limit_waits: u32,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for CallPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            paid_tier: config.paid_tier,
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            rate_limit_wait: Duration::from_millis(config.rate_limit_wait_ms),
            max_rate_limit_waits: config.max_rate_limit_waits,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// Providers, model chain, and policy for one orchestrator
pub struct ProviderSet {
    providers: Vec<Arc<dyn LlmProvider>>,
    models: ModelRegistry,
    policy: CallPolicy,
    dry_run: bool,
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("ProviderSet")
            .field("providers", &names)
            .field("models", &self.models.len())
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl ProviderSet {
    /// Build a provider set.
    ///
    /// Without dry run at least one provider is required.
    pub fn new(
        providers: Vec<Arc<dyn LlmProvider>>,
        models: ModelRegistry,
        policy: CallPolicy,
        dry_run: bool,
    ) -> AppResult<Self> {
        if providers.is_empty() && !dry_run {
            return Err(AppError::config(
                "No usable provider: configure an API key or enable dry run",
            ));
        }
        Ok(Self {
            providers,
            models,
            policy,
            dry_run,
        })
    }

    /// Build the HTTP adapters named by the configuration.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let models = config.model_registry().map_err(AppError::config)?;
        let providers = build_providers(config, &models)?;
        if !providers.is_empty() {
            let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
            tracing::info!(providers = ?names, "Providers configured");
        }
        Self::new(providers, models, CallPolicy::from(config), config.dry_run)
    }

    pub fn providers(&self) -> &[Arc<dyn LlmProvider>] {
        &self.providers
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn policy(&self) -> &CallPolicy {
        &self.policy
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// A caller with fresh model and provider cursors.
    pub fn caller(&self) -> ProviderCaller<'_> {
        ProviderCaller::new(self)
    }

    /// A caller continuing from `cursor`.
    pub fn resume(&self, cursor: CallerCursor) -> ProviderCaller<'_> {
        ProviderCaller::resume(self, cursor)
    }
}

fn build_providers(
    config: &AppConfig,
    models: &ModelRegistry,
) -> AppResult<Vec<Arc<dyn LlmProvider>>> {
    let wanted = |provider: ProviderType| config.force_provider.map_or(true, |p| p == provider);
    let mut providers: Vec<Arc<dyn LlmProvider>> = Vec::new();

    if wanted(ProviderType::Gemini) {
        if let Some(key) = &config.gemini_api_key {
            let provider_config = ProviderConfig {
                provider: ProviderType::Gemini,
                api_key: Some(key.clone()),
                model: models.first().model_id.clone(),
                max_tokens: config.max_output_tokens,
                temperature: config.temperature,
                timeout_secs: config.request_timeout_secs,
                ..Default::default()
            };
            providers.push(Arc::new(GeminiProvider::new(provider_config)?));
        }
    }

    if wanted(ProviderType::Anthropic) {
        if let Some(provider_config) = secondary_config(
            ProviderType::Anthropic,
            config.anthropic_api_key.as_ref(),
            &config.anthropic_models,
            config,
        ) {
            providers.push(Arc::new(AnthropicProvider::new(provider_config)?));
        }
    }

    if wanted(ProviderType::OpenAI) {
        if let Some(provider_config) = secondary_config(
            ProviderType::OpenAI,
            config.openai_api_key.as_ref(),
            &config.openai_models,
            config,
        ) {
            providers.push(Arc::new(OpenAIProvider::new(provider_config)?));
        }
    }

    if let (Some(forced), true) = (config.force_provider, providers.is_empty()) {
        tracing::warn!(provider = %forced, "Forced provider has no API key configured");
    }

    Ok(providers)
}

fn secondary_config(
    provider: ProviderType,
    api_key: Option<&String>,
    models: &[String],
    config: &AppConfig,
) -> Option<ProviderConfig> {
    let key = api_key?;
    let (model, fallback) = match models.split_first() {
        Some((first, rest)) => (first.clone(), rest.to_vec()),
        None => {
            tracing::warn!(provider = %provider, "Skipping provider with empty model list");
            return None;
        }
    };
    Some(ProviderConfig {
        provider,
        api_key: Some(key.clone()),
        base_url: None,
        model,
        fallback_models: fallback,
        max_tokens: config.max_output_tokens,
        temperature: config.temperature,
        timeout_secs: config.request_timeout_secs,
    })
}
