//! Scripted provider for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use report_narrator_llm::{
    GenerateOptions, GeneratedText, LlmError, LlmProvider, LlmResult, ProviderConfig,
    ProviderType, UsageStats,
};

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Error(LlmError),
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Reply::Text(text.to_string())
    }

    pub fn rate_limited() -> Self {
        Reply::Error(LlmError::RateLimited {
            message: "quota exceeded".to_string(),
            retry_after_ms: None,
        })
    }

    pub fn rate_limited_after(ms: u64) -> Self {
        Reply::Error(LlmError::RateLimited {
            message: "quota exceeded".to_string(),
            retry_after_ms: Some(ms),
        })
    }

    pub fn network_error() -> Self {
        Reply::Error(LlmError::NetworkError {
            message: "connection reset".to_string(),
        })
    }

    pub fn auth_error() -> Self {
        Reply::Error(LlmError::AuthenticationFailed {
            message: "bad key".to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: Option<String>,
    pub system: String,
    pub user: String,
    pub at: Instant,
}

pub struct MockProvider {
    name: &'static str,
    chain_bound: bool,
    replies: Mutex<VecDeque<Reply>>,
    repeat_last: bool,
    last: Mutex<Option<Reply>>,
    calls: Mutex<Vec<RecordedCall>>,
    config: ProviderConfig,
}

impl MockProvider {
    /// A primary provider driven by the model chain
    pub fn chain(replies: Vec<Reply>) -> Self {
        Self::build("mock", true, replies)
    }

    /// A secondary provider with its own models
    pub fn secondary(name: &'static str, replies: Vec<Reply>) -> Self {
        Self::build(name, false, replies)
    }

    fn build(name: &'static str, chain_bound: bool, replies: Vec<Reply>) -> Self {
        Self {
            name,
            chain_bound,
            replies: Mutex::new(replies.into()),
            repeat_last: false,
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            config: ProviderConfig {
                model: format!("{}-model", name),
                ..Default::default()
            },
        }
    }

    /// Keep answering with the final scripted reply once the script runs out
    pub fn repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_reply(&self) -> Option<Reply> {
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) => {
                *self.last.lock().unwrap() = Some(reply.clone());
                Some(reply)
            }
            None if self.repeat_last => self.last.lock().unwrap().clone(),
            None => None,
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Gemini
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn uses_model_chain(&self) -> bool {
        self.chain_bound
    }

    async fn generate(
        &self,
        system: &str,
        user: &str,
        options: &GenerateOptions,
    ) -> LlmResult<GeneratedText> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: options.model.clone(),
            system: system.to_string(),
            user: user.to_string(),
            at: Instant::now(),
        });

        match self.next_reply() {
            Some(Reply::Text(text)) => {
                let model = options.model.clone().unwrap_or_else(|| self.config.model.clone());
                Ok(GeneratedText::new(text, model)
                    .with_usage(UsageStats {
                        input_tokens: 10,
                        output_tokens: 5,
                    })
                    .parse_structured(options.structured))
            }
            Some(Reply::Error(err)) => Err(err),
            None => Err(LlmError::Other {
                message: "no scripted reply left".to_string(),
            }),
        }
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}
