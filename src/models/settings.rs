//! Settings Models
//!
//! Run configuration and settings data structures.

use serde::{Deserialize, Serialize};

use report_narrator_llm::{ModelDescriptor, ModelRegistry, ProviderType};

/// How placeholders are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStrategy {
    /// One generation call per placeholder
    #[default]
    PerPlaceholder,
    /// One composite call (plus an optional verify pass) for all fields
    Batch,
}

/// Output polisher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolishSettings {
    /// Run the model-based cleanup pass before the deterministic rules
    #[serde(default = "default_true")]
    pub model_pass: bool,
    /// Substrings the model pass output must keep to be accepted
    #[serde(default = "default_required_markers")]
    pub required_markers: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_required_markers() -> Vec<String> {
    vec!["{".to_string(), "}".to_string()]
}

impl Default for PolishSettings {
    fn default() -> Self {
        Self {
            model_pass: true,
            required_markers: default_required_markers(),
        }
    }
}

/// Run configuration stored in report-narrator.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Gemini API key (primary provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    /// Anthropic API key (secondary provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,
    /// OpenAI API key (secondary provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    /// Use only this provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_provider: Option<ProviderType>,
    /// Skip every generation call and write inert stub output
    #[serde(default)]
    pub dry_run: bool,
    /// Paid-tier quota: no inter-call spacing
    #[serde(default)]
    pub paid_tier: bool,
    #[serde(default)]
    pub strategy: GenerationStrategy,
    /// Issue the verify-and-correct call after a batch generation
    #[serde(default = "default_true")]
    pub verify_batch: bool,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Retries for transient failures, per placeholder
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Linear backoff unit: attempt N waits N times this
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Wait on the last model when it is throttled without a retry-after hint
    #[serde(default = "default_rate_limit_wait_ms")]
    pub rate_limit_wait_ms: u64,
    /// Bound on wait-and-retry rounds on the last model
    #[serde(default = "default_max_rate_limit_waits")]
    pub max_rate_limit_waits: u32,
    /// Ranked model chain override for the primary provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<ModelDescriptor>>,
    #[serde(default = "default_anthropic_models")]
    pub anthropic_models: Vec<String>,
    #[serde(default = "default_openai_models")]
    pub openai_models: Vec<String>,
    /// Prompt registry JSON file
    #[serde(default = "default_prompt_registry_path")]
    pub prompt_registry_path: String,
    #[serde(default)]
    pub polish: PolishSettings,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_temperature() -> f32 {
    0.4
}

fn default_max_output_tokens() -> u32 {
    2048
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    2_000
}

fn default_rate_limit_wait_ms() -> u64 {
    60_000
}

fn default_max_rate_limit_waits() -> u32 {
    3
}

fn default_anthropic_models() -> Vec<String> {
    vec![
        "claude-sonnet-4-20250514".to_string(),
        "claude-3-5-haiku-20241022".to_string(),
    ]
}

fn default_openai_models() -> Vec<String> {
    vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()]
}

fn default_prompt_registry_path() -> String {
    "prompts.json".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            anthropic_api_key: None,
            openai_api_key: None,
            force_provider: None,
            dry_run: false,
            paid_tier: false,
            strategy: GenerationStrategy::default(),
            verify_batch: true,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            rate_limit_wait_ms: default_rate_limit_wait_ms(),
            max_rate_limit_waits: default_max_rate_limit_waits(),
            models: None,
            anthropic_models: default_anthropic_models(),
            openai_models: default_openai_models(),
            prompt_registry_path: default_prompt_registry_path(),
            polish: PolishSettings::default(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub force_provider: Option<ProviderType>,
    pub dry_run: Option<bool>,
    pub paid_tier: Option<bool>,
    pub strategy: Option<GenerationStrategy>,
    pub verify_batch: Option<bool>,
    pub temperature: Option<f32>,
    pub max_retries: Option<u32>,
    pub prompt_registry_path: Option<String>,
}

impl AppConfig {
    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(provider) = update.force_provider {
            self.force_provider = Some(provider);
        }
        if let Some(dry_run) = update.dry_run {
            self.dry_run = dry_run;
        }
        if let Some(paid_tier) = update.paid_tier {
            self.paid_tier = paid_tier;
        }
        if let Some(strategy) = update.strategy {
            self.strategy = strategy;
        }
        if let Some(verify) = update.verify_batch {
            self.verify_batch = verify;
        }
        if let Some(temperature) = update.temperature {
            self.temperature = temperature;
        }
        if let Some(retries) = update.max_retries {
            self.max_retries = retries;
        }
        if let Some(path) = update.prompt_registry_path {
            self.prompt_registry_path = path;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "Invalid temperature: {}. Must be between 0.0 and 2.0",
                self.temperature
            ));
        }

        if self.max_output_tokens == 0 {
            return Err("max_output_tokens must be greater than 0".to_string());
        }

        if self.max_retries > 10 {
            return Err("max_retries cannot exceed 10".to_string());
        }

        if self.prompt_registry_path.trim().is_empty() {
            return Err("prompt_registry_path must not be empty".to_string());
        }

        if let Some(models) = &self.models {
            ModelRegistry::new(models.clone()).map_err(|e| e.to_string())?;
        }

        Ok(())
    }

    /// The ranked model chain for the primary provider
    pub fn model_registry(&self) -> Result<ModelRegistry, String> {
        match &self.models {
            Some(models) => ModelRegistry::new(models.clone()).map_err(|e| e.to_string()),
            None => Ok(ModelRegistry::default_gemini()),
        }
    }
}
