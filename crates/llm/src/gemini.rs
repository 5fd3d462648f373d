//! Gemini Provider
//!
//! Primary adapter. It is bound to the ranked model chain: the orchestrator
//! chooses the model for each call and passes it through
//! `GenerateOptions::model`, so this adapter never falls back on its own.

use async_trait::async_trait;
use serde::Deserialize;

use super::provider::{missing_api_key_error, send_json_request, LlmProvider};
use super::types::{
    GenerateOptions, GeneratedText, LlmError, LlmResult, ProviderConfig, ProviderType, UsageStats,
};
use crate::http_client::build_http_client;

/// Default Gemini API base (model path and verb are appended)
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini provider
pub struct GeminiProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider with the given configuration
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let client = build_http_client(config.timeout_secs)?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, model: &str) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(GEMINI_API_BASE)
            .trim_end_matches('/');
        format!("{}/{}:generateContent", base, model)
    }

    /// Build the request body for the API
    fn build_request_body(
        &self,
        system: &str,
        user: &str,
        options: &GenerateOptions,
    ) -> serde_json::Value {
        let mut generation_config = serde_json::json!({
            "temperature": options.temperature.unwrap_or(self.config.temperature),
            "maxOutputTokens": options.max_output_tokens.unwrap_or(self.config.max_tokens),
        });
        if options.structured {
            generation_config["responseMimeType"] = serde_json::json!("application/json");
        }

        let mut body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": user}]
            }],
            "generationConfig": generation_config,
        });

        if !system.trim().is_empty() {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{"text": system}]
            });
        }

        body
    }

    /// Parse a response from the Gemini API
    fn parse_response(&self, response: GeminiResponse, model: &str) -> LlmResult<GeneratedText> {
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ParseError {
                message: "Gemini response contained no candidates".to_string(),
            })?;

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(LlmError::ParseError {
                message: format!(
                    "Gemini returned no text (finish reason: {})",
                    candidate.finish_reason.as_deref().unwrap_or("unknown")
                ),
            });
        }

        let usage = response
            .usage_metadata
            .map(|u| UsageStats {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();

        Ok(GeneratedText::new(text, response.model_version.unwrap_or_else(|| model.to_string()))
            .with_usage(usage))
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Gemini
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn uses_model_chain(&self) -> bool {
        true
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
            .as_ref()
            .ok_or_else(|| missing_api_key_error("gemini"))?;

        let model = options.model.as_deref().unwrap_or(&self.config.model);
        let body = self.build_request_body(system, user, options);

        let request = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&body);
        let body_text = send_json_request(request, "gemini").await?;

        let response: GeminiResponse =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ParseError {
                message: format!("Failed to parse response: {}", e),
            })?;

        tracing::debug!(model, "Gemini generation complete");
        Ok(self.parse_response(response, model)?.parse_structured(options.structured))
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Gemini API response format
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}
