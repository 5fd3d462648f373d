//! OpenAI Provider
//!
//! Secondary adapter for the Chat Completions API with a provider-internal
//! model fallback list.

use async_trait::async_trait;
use serde::Deserialize;

use super::provider::{
    generate_with_model_fallback, missing_api_key_error, send_json_request, LlmProvider,
};
use super::types::{
    GenerateOptions, GeneratedText, LlmError, LlmResult, ProviderConfig, ProviderType, UsageStats,
};
use crate::http_client::build_http_client;

/// Default OpenAI API endpoint
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI provider
pub struct OpenAIProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with the given configuration
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let client = build_http_client(config.timeout_secs)?;
        Ok(Self { config, client })
    }

    /// Get the API base URL
    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(OPENAI_API_URL)
    }

    fn models(&self) -> Vec<String> {
        let mut models = vec![self.config.model.clone()];
        for model in &self.config.fallback_models {
            if !models.contains(model) {
                models.push(model.clone());
            }
        }
        models
    }

    /// Reasoning models reject a custom temperature
    fn is_reasoning_model(model: &str) -> bool {
        let model = model.to_lowercase();
        model.starts_with("o1") || model.starts_with("o3") || model.starts_with("o4")
    }

    /// Build the request body for the API
    fn build_request_body(
        &self,
        model: &str,
        system: &str,
        user: &str,
        options: &GenerateOptions,
    ) -> serde_json::Value {
        let mut messages = Vec::new();
        if !system.trim().is_empty() {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": user}));

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "max_completion_tokens": options.max_output_tokens.unwrap_or(self.config.max_tokens),
        });

        if !Self::is_reasoning_model(model) {
            body["temperature"] =
                serde_json::json!(options.temperature.unwrap_or(self.config.temperature));
        }
        if options.structured {
            body["response_format"] = serde_json::json!({"type": "json_object"});
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
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body);
        let body_text = send_json_request(request, "openai").await?;

        let response: OpenAIResponse =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ParseError {
                message: format!("Failed to parse response: {}", e),
            })?;
        Ok(parse_response(response)?.parse_structured(options.structured))
    }
}

/// Parse a response from the Chat Completions API
fn parse_response(response: OpenAIResponse) -> LlmResult<GeneratedText> {
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .filter(|content| !content.is_empty())
        .ok_or_else(|| LlmError::ParseError {
            message: "OpenAI response contained no content".to_string(),
        })?;

    let usage = response
        .usage
        .map(|u| UsageStats {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(GeneratedText::new(text, response.model).with_usage(usage))
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAI
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
            .ok_or_else(|| missing_api_key_error("openai"))?;

        let models = self.models();
        generate_with_model_fallback("openai", &models, |model| {
            self.generate_with(api_key, model, system, user, options)
        })
        .await
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// OpenAI API response format
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
