//! LLM Provider Trait
//!
//! Defines the common interface for all text-generation providers, plus the
//! helpers adapters share for turning backend responses into `LlmError`s.

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

use super::types::{
    GenerateOptions, GeneratedText, LlmError, LlmResult, ProviderConfig, ProviderType,
};

/// Trait that all text-generation providers must implement.
///
/// The orchestrator treats every adapter as a black box exposing `generate`;
/// request and response shapes never leave the adapter.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider name for identification.
    fn name(&self) -> &'static str;

    /// Returns the backend this adapter talks to.
    fn provider_type(&self) -> ProviderType;

    /// Returns the default model being used.
    fn model(&self) -> &str;

    /// Whether the adapter expects the caller to pick the model from the
    /// ranked chain (passed through `GenerateOptions::model`).
    ///
    /// Adapters returning `false` run their own internal model fallback.
    fn uses_model_chain(&self) -> bool {
        false
    }

    /// Generate text for one system/user prompt pair.
    ///
    /// Raw text is returned as-is (code fences included). When
    /// `options.structured` is set the adapter also tries to parse the text
    /// as JSON and silently keeps the raw text if that fails.
    async fn generate(
        &self,
        system: &str,
        user: &str,
        options: &GenerateOptions,
    ) -> LlmResult<GeneratedText>;

    /// Get the configuration for this provider.
    fn config(&self) -> &ProviderConfig;
}

/// Helper function to create an error for missing API key
pub fn missing_api_key_error(provider: &str) -> LlmError {
    LlmError::AuthenticationFailed {
        message: format!("API key not configured for {}", provider),
    }
}

/// Body fragments backends use to signal throttling regardless of status
const THROTTLE_MARKERS: &[&str] = &[
    "RESOURCE_EXHAUSTED",
    "rate_limit_error",
    "rate_limit_exceeded",
    "overloaded_error",
];

fn body_signals_throttling(body: &str) -> bool {
    THROTTLE_MARKERS.iter().any(|marker| body.contains(marker))
}

/// Helper function to parse HTTP error status codes
pub fn parse_http_error(status: u16, body: &str, provider: &str) -> LlmError {
    if status == 429 || status == 503 || body_signals_throttling(body) {
        return LlmError::RateLimited {
            message: format!("{}: {}", provider, body),
            retry_after_ms: retry_delay_from_body(body),
        };
    }

    match status {
        401 => LlmError::AuthenticationFailed {
            message: format!("{}: Invalid API key", provider),
        },
        403 => LlmError::AuthenticationFailed {
            message: format!("{}: Access denied", provider),
        },
        404 => LlmError::ModelNotFound {
            model: body.to_string(),
        },
        400 => LlmError::InvalidRequest {
            message: body.to_string(),
        },
        500..=599 => LlmError::ServerError {
            message: body.to_string(),
            status: Some(status),
        },
        _ => LlmError::Other {
            message: format!("HTTP {}: {}", status, body),
        },
    }
}

/// Parse a `retry-after` header value (whole seconds) into milliseconds.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    let seconds: f64 = value.trim().parse().ok()?;
    if seconds.is_sign_negative() || !seconds.is_finite() {
        return None;
    }
    Some((seconds * 1000.0).round() as u64)
}

/// Read Gemini's `RetryInfo.retryDelay` (e.g. `"12s"`, `"1.5s"`) from an
/// error body.
pub fn retry_delay_from_body(body: &str) -> Option<u64> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let details = parsed.get("error")?.get("details")?.as_array()?;
    details.iter().find_map(|detail| {
        let delay = detail.get("retryDelay")?.as_str()?;
        parse_retry_after(delay.trim_end_matches('s'))
    })
}

/// Map a transport failure into `Timeout` or `NetworkError`.
pub fn network_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout {
            message: err.to_string(),
        }
    } else {
        LlmError::NetworkError {
            message: err.to_string(),
        }
    }
}

/// Send a prepared JSON request and return the body of a 2xx response.
///
/// Non-2xx responses are parsed into the error taxonomy, with the
/// `retry-after` header folded into rate-limit errors.
pub async fn send_json_request(
    request: reqwest::RequestBuilder,
    provider: &str,
) -> LlmResult<String> {
    let response = request.send().await.map_err(network_error)?;

    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after);
    let body_text = response.text().await.map_err(network_error)?;

    if !(200..300).contains(&status) {
        return Err(parse_http_error(status, &body_text, provider).with_retry_after(retry_after));
    }

    Ok(body_text)
}

/// Run `call` against each model in order, moving on only when a model is
/// rate limited or missing. Any other error is returned immediately.
///
/// Used by secondary adapters that own a provider-internal fallback list.
pub async fn generate_with_model_fallback<F, Fut>(
    provider: &str,
    models: &[String],
    mut call: F,
) -> LlmResult<GeneratedText>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = LlmResult<GeneratedText>>,
{
    let mut last_error = LlmError::ProviderUnavailable {
        message: format!("{}: no models configured", provider),
    };

    for (position, model) in models.iter().enumerate() {
        match call(model.clone()).await {
            Ok(text) => return Ok(text),
            Err(err @ (LlmError::RateLimited { .. } | LlmError::ModelNotFound { .. })) => {
                if let Some(next) = models.get(position + 1) {
                    tracing::warn!(
                        provider,
                        model = %model,
                        next = %next,
                        error = %err,
                        "Model unavailable, trying next provider model"
                    );
                }
                last_error = err;
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_error)
}
