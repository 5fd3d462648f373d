//! Shared fixtures: a scripted provider and orchestrator builders.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use report_narrator::services::generation::{CallPolicy, GenerationOrchestrator, ProviderSet};
use report_narrator::services::prompts::PromptRegistry;
use report_narrator_llm::{
    GenerateOptions, GeneratedText, LlmError, LlmProvider, LlmResult, ModelDescriptor,
    ModelRegistry, ModelTier, ProviderConfig, ProviderType, UsageStats,
};

/// A chain-bound provider answering from a script.
///
/// Once the script runs out the `fallback` answer is repeated.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Result<String, LlmError>,
    calls: Mutex<Vec<(String, Instant)>>,
    config: ProviderConfig,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<String, LlmError>>) -> Self {
        Self::with_fallback(
            script,
            Err(LlmError::Other {
                message: "script exhausted".to_string(),
            }),
        )
    }

    pub fn with_fallback(script: Vec<Result<String, LlmError>>, fallback: Result<String, LlmError>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
            config: ProviderConfig {
                model: "scripted".to_string(),
                ..Default::default()
            },
        }
    }

    /// Model id and start instant of every call
    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
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
        _system: &str,
        _user: &str,
        options: &GenerateOptions,
    ) -> LlmResult<GeneratedText> {
        let model = options.model.clone().unwrap_or_else(|| self.config.model.clone());
        self.calls.lock().unwrap().push((model.clone(), Instant::now()));

        let next = self.script.lock().unwrap().pop_front();
        match next.unwrap_or_else(|| self.fallback.clone()) {
            Ok(text) => Ok(GeneratedText::new(text, model)
                .with_usage(UsageStats {
                    input_tokens: 20,
                    output_tokens: 10,
                })
                .parse_structured(options.structured)),
            Err(err) => Err(err),
        }
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

pub fn text(value: &str) -> Result<String, LlmError> {
    Ok(value.to_string())
}

pub fn rate_limited() -> Result<String, LlmError> {
    Err(LlmError::RateLimited {
        message: "429 Too Many Requests".to_string(),
        retry_after_ms: None,
    })
}

pub fn fatal() -> Result<String, LlmError> {
    Err(LlmError::AuthenticationFailed {
        message: "invalid key".to_string(),
    })
}

/// Chain of models with the given minimum spacing each
pub fn chain(delays_ms: &[u64]) -> ModelRegistry {
    let models = delays_ms
        .iter()
        .enumerate()
        .map(|(i, delay)| ModelDescriptor::new(format!("model-{}", i + 1), ModelTier::Standard, *delay, 0))
        .collect();
    ModelRegistry::new(models).unwrap()
}

pub fn policy() -> CallPolicy {
    CallPolicy {
        paid_tier: false,
        max_retries: 2,
        retry_base_delay: Duration::from_millis(100),
        rate_limit_wait: Duration::from_millis(1_000),
        max_rate_limit_waits: 2,
        temperature: 0.4,
        max_output_tokens: 1024,
    }
}

pub fn report_prompts() -> Arc<PromptRegistry> {
    let registry = json!({
        "prompts": {
            "title": {"user_template": "Write a report title for {{document_title}}."},
            "risk": {
                "system_instructions": "You assess operational risk.",
                "user_template": "Describe the risk for {{qualifier}}.\n{{context}}",
                "requires_approval": true,
                "constraints": {"max_length_chars": 200}
            },
            "executive_summary": {"user_template": "Summarize:\n{{context}}"},
            "next_steps": {"output_kind": "array_of_strings", "user_template": "List next steps."}
        },
        "batch_fields": [
            {"key": "executive_summary", "path": "summary", "description": "Two-sentence overview"},
            {"key": "next_steps", "path": "plan.steps", "kind": "array_of_strings"}
        ]
    });
    Arc::new(PromptRegistry::from_value(registry).unwrap())
}

pub fn orchestrator(
    provider: Arc<ScriptedProvider>,
    models: ModelRegistry,
    policy: CallPolicy,
) -> GenerationOrchestrator {
    let providers: Vec<Arc<dyn LlmProvider>> = vec![provider];
    let set = ProviderSet::new(providers, models, policy, false).unwrap();
    GenerationOrchestrator::new(report_prompts(), Arc::new(set))
}

pub fn assessment() -> Value {
    json!({
        "title": "[MARKER: title]",
        "client_name": "Acme Logistics",
        "summary": "[MARKER: executive_summary]",
        "scorecard": [
            {"category": "CategoryX", "status": "red", "metric": 42, "risk": "[MARKER: risk for CategoryX]"},
            {"category": "CategoryY", "status": "amber", "metric": 17, "risk": "[MARKER: risk for CategoryY]"}
        ],
        "plan": {"steps": ["[MARKER: next_steps]"]}
    })
}
