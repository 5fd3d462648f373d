//! LLM Types
//!
//! Core types for text-generation provider interactions.

use report_narrator_core::extract_json_value;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Supported text-generation backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Gemini,
    Anthropic,
    OpenAI,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::Gemini => write!(f, "gemini"),
            ProviderType::Anthropic => write!(f, "anthropic"),
            ProviderType::OpenAI => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for ProviderType {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderType::Gemini),
            "anthropic" | "claude" => Ok(ProviderType::Anthropic),
            "openai" => Ok(ProviderType::OpenAI),
            other => Err(LlmError::InvalidRequest {
                message: format!("Unknown provider: {}", other),
            }),
        }
    }
}

/// Configuration for one provider adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// The provider type
    pub provider: ProviderType,
    /// API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL override (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Default model name
    pub model: String,
    /// Further models tried in order when `model` is rate limited.
    /// Only used by adapters that manage their own fallback.
    #[serde(default)]
    pub fallback_models: Vec<String>,
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.4
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::Gemini,
            api_key: None,
            base_url: None,
            model: "gemini-2.5-pro".to_string(),
            fallback_models: Vec::new(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Per-call options for `generate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Model override; chain-bound adapters receive the currently selected model here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Optional temperature override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Optional output size override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// How many times the caller may retry transient failures
    #[serde(default)]
    pub max_retries: u32,
    /// Ask for JSON output and attempt to parse it
    #[serde(default)]
    pub structured: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: None,
            max_output_tokens: None,
            max_retries: 3,
            structured: false,
        }
    }
}

impl GenerateOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn structured(mut self) -> Self {
        self.structured = true;
        self
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    /// Number of input/prompt tokens
    pub input_tokens: u32,
    /// Number of output/completion tokens
    pub output_tokens: u32,
}

impl UsageStats {
    /// Total tokens used
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Successful generation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedText {
    /// Raw model text, code fences and all
    pub text: String,
    /// Parsed JSON, present only when structured output was requested and parsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
    /// Token usage statistics
    pub usage: UsageStats,
    /// The model that generated the response
    pub model: String,
}

impl GeneratedText {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            structured: None,
            usage: UsageStats::default(),
            model: model.into(),
        }
    }

    pub fn with_usage(mut self, usage: UsageStats) -> Self {
        self.usage = usage;
        self
    }

    /// Attempt to parse the text as JSON when `requested`.
    ///
    /// A parse failure is not an error: the raw text is kept untouched and
    /// `structured` stays empty.
    pub fn parse_structured(mut self, requested: bool) -> Self {
        if requested {
            self.structured = extract_json_value(&self.text);
        }
        self
    }
}

/// Coarse classification that drives retry and fallback decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Backend throttling; move down the fallback chain or wait
    RateLimited,
    /// Retry in place with backoff
    Transient,
    /// Do not retry
    Fatal,
}

/// Error types for LLM operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmError {
    /// Authentication failed (invalid API key)
    AuthenticationFailed { message: String },
    /// Rate limit exceeded
    RateLimited {
        message: String,
        retry_after_ms: Option<u64>,
    },
    /// Model not found or not available on the backend
    ModelNotFound { model: String },
    /// Model id not present in the ranked model chain
    UnknownModel { model: String },
    /// Invalid request (bad parameters)
    InvalidRequest { message: String },
    /// Server error from the provider
    ServerError {
        message: String,
        status: Option<u16>,
    },
    /// Network/connection error
    NetworkError { message: String },
    /// Request timed out
    Timeout { message: String },
    /// Response parsing error
    ParseError { message: String },
    /// Provider not reachable or not configured
    ProviderUnavailable { message: String },
    /// Other error
    Other { message: String },
}

impl LlmError {
    /// Fold the error into the retry/fallback classification
    pub fn kind(&self) -> FailureKind {
        match self {
            LlmError::RateLimited { .. } => FailureKind::RateLimited,
            LlmError::ServerError { .. }
            | LlmError::NetworkError { .. }
            | LlmError::Timeout { .. }
            | LlmError::ProviderUnavailable { .. } => FailureKind::Transient,
            LlmError::AuthenticationFailed { .. }
            | LlmError::ModelNotFound { .. }
            | LlmError::UnknownModel { .. }
            | LlmError::InvalidRequest { .. }
            | LlmError::ParseError { .. }
            | LlmError::Other { .. } => FailureKind::Fatal,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind() == FailureKind::RateLimited
    }

    /// Whether retrying in place may succeed
    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::Transient
    }

    /// Backend-signaled wait before retrying, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited {
                retry_after_ms: Some(ms),
                ..
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }

    /// Fill in a retry-after hint if the error is a rate limit without one
    pub fn with_retry_after(self, hint_ms: Option<u64>) -> Self {
        match self {
            LlmError::RateLimited {
                message,
                retry_after_ms: None,
            } => LlmError::RateLimited {
                message,
                retry_after_ms: hint_ms,
            },
            other => other,
        }
    }
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::AuthenticationFailed { message } => {
                write!(f, "Authentication failed: {}", message)
            }
            LlmError::RateLimited { message, .. } => {
                write!(f, "Rate limited: {}", message)
            }
            LlmError::ModelNotFound { model } => {
                write!(f, "Model not found: {}", model)
            }
            LlmError::UnknownModel { model } => {
                write!(f, "Unknown model in chain: {}", model)
            }
            LlmError::InvalidRequest { message } => {
                write!(f, "Invalid request: {}", message)
            }
            LlmError::ServerError { message, status } => {
                if let Some(s) = status {
                    write!(f, "Server error ({}): {}", s, message)
                } else {
                    write!(f, "Server error: {}", message)
                }
            }
            LlmError::NetworkError { message } => {
                write!(f, "Network error: {}", message)
            }
            LlmError::Timeout { message } => {
                write!(f, "Timed out: {}", message)
            }
            LlmError::ParseError { message } => {
                write!(f, "Parse error: {}", message)
            }
            LlmError::ProviderUnavailable { message } => {
                write!(f, "Provider unavailable: {}", message)
            }
            LlmError::Other { message } => {
                write!(f, "Error: {}", message)
            }
        }
    }
}

impl std::error::Error for LlmError {}

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;
