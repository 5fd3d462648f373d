//! Report Narrator LLM
//!
//! Provides a unified text-generation interface over several providers:
//! - Google Gemini (primary, driven by the ranked model chain)
//! - Anthropic Claude (secondary, internal model fallback)
//! - OpenAI (secondary, internal model fallback)
//!
//! Also includes the model registry, the shared error taxonomy, and the HTTP
//! client factory.

pub mod anthropic;
pub mod gemini;
pub mod http_client;
pub mod openai;
pub mod provider;
pub mod registry;
pub mod types;

// Re-export main types
pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use http_client::build_http_client;
pub use openai::OpenAIProvider;
pub use provider::{parse_http_error, LlmProvider};
pub use registry::{ModelDescriptor, ModelRegistry, ModelTier};
pub use types::*;
