//! Anthropic Provider
//!
//! Secondary adapter for the Claude Messages API. Keeps its own model
//! fallback list (`model` followed by `fallback_models`).

use async_trait::async_trait;
use serde::Deserialize;

use super::provider::{
    generate_with_model_fallback, missing_api_key_error, send_json_request, LlmProvider,
};
use super::types::{
    GenerateOptions, GeneratedText, LlmError, LlmResult, ProviderConfig, ProviderType, UsageStats,
};
use crate::http_client::build_http_client;

/// Default Anthropic API endpoint
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Current API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider
pub struct AnthropicProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given configuration
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let client = build_http_client(config.timeout_secs)?;
        Ok(Self { config, client })
    }

    /// Get the API base URL
    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL)
    }

    /// Models tried in order
    fn models(&self) -> Vec<String> {
        let mut models = vec![self.config.model.clone()];
        for model in &self.config.fallback_models {
            if !models.contains(model) {
                models.push(model.clone());
            }
        }
        models
    }

    /// Build the request body for the API
    fn build_request_body(
        &self,
        model: &str,
        system: &str,
        user: &str,
        options: &GenerateOptions,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": options.max_output_tokens.unwrap_or(self.config.max_tokens),
            "temperature": options.temperature.unwrap_or(self.config.temperature),
            "messages": [{"role": "user", "content": user}],
        });
        if !system.trim().is_empty() {
            body["system"] = serde_json::json!(system);
        }
        body
    }

    async fn generate_with(
        &self,
        api_key: &str,
        model: String,
        system: &str,
        user: &str,
        options: &GenerateOptions,
    ) -> LlmResult<GeneratedText> {
        let body = self.build_request_body(&model, system, user, options);
        let request = self
            .client
            .post(self.base_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);
        let body_text = send_json_request(request, "anthropic").await?;

        let response: ClaudeResponse =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ParseError {
                message: format!("Failed to parse response: {}", e),
            })?;
        Ok(parse_response(response)?.parse_structured(options.structured))
    }
}

/// Parse a response from the Messages API
fn parse_response(response: ClaudeResponse) -> LlmResult<GeneratedText> {
    let text: String = response
        .content
        .into_iter()
        .filter(|block| block.block_type == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(LlmError::ParseError {
            message: "Anthropic response contained no text".to_string(),
        });
    }

    let usage = UsageStats {
        input_tokens: response.usage.input_tokens,
        output_tokens: response.usage.output_tokens,
    };
    Ok(GeneratedText::new(text, response.model).with_usage(usage))
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Anthropic
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        system: &str,
        user: &str,
        options: &GenerateOptions,
    ) -> LlmResult<GeneratedText> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| missing_api_key_error("anthropic"))?;

        let models = self.models();
        generate_with_model_fallback("anthropic", &models, |model| {
            self.generate_with(api_key, model, system, user, options)
        })
        .await
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Messages API response format
#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    model: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: ClaudeUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}
