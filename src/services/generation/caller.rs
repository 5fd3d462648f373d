//! Provider Caller
//!
//! Issues one logical generation request with the full degradation policy:
//!
//! - calls to the same model are spaced by `ModelRegistry::delay_for`, using
//!   one clock per model shared by every request in the run
//! - a rate-limited chain model moves the cursor to the next ranked model and
//!   retries immediately; on the last model the caller sleeps for the
//!   signaled retry-after (or the configured wait) and retries, a bounded
//!   number of times
//! - transient failures retry in place with linear backoff
//! - fatal or exhausted failures move to the next provider
//!
//! Both cursors only move forward. A caller lives for one run; its
//! `CallerCursor` can be handed on so later stages keep the same position and
//! spacing clock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep, sleep_until, Instant};

use report_narrator_llm::{FailureKind, GenerateOptions, GeneratedText, LlmError, LlmProvider};

use super::providers::ProviderSet;
use crate::models::stats::{AttemptOutcome, RunStats, TransitionKind};

/// Inert text returned for every request in dry-run mode
pub const DRY_RUN_TEXT: &str = "Dry run output.";

/// Why a request produced no text
#[derive(Debug, Clone, PartialEq)]
pub enum CallFailure {
    /// Retries or rate-limit waits ran out
    Exhausted(LlmError),
    /// Not retryable on any provider
    Fatal(LlmError),
}

impl CallFailure {
    pub fn error(&self) -> &LlmError {
        match self {
            CallFailure::Exhausted(err) | CallFailure::Fatal(err) => err,
        }
    }
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallFailure::Exhausted(err) => write!(f, "exhausted: {}", err),
            CallFailure::Fatal(err) => write!(f, "fatal: {}", err),
        }
    }
}

/// Where a run stands in the degradation order.
///
/// Owned so it can outlive one caller: the polish pass resumes from the
/// cursor the generation run left behind.
#[derive(Debug, Clone, Default)]
pub struct CallerCursor {
    /// Rank position of the selected chain model
    model_position: usize,
    /// Index of the selected provider
    provider_index: usize,
    /// Start time of the latest call per model (or per secondary provider)
    last_call: HashMap<String, Instant>,
}

impl CallerCursor {
    pub fn model_position(&self) -> usize {
        self.model_position
    }

    pub fn provider_index(&self) -> usize {
        self.provider_index
    }
}

/// Stateful caller for one run
pub struct ProviderCaller<'a> {
    set: &'a ProviderSet,
    cursor: CallerCursor,
}

impl<'a> ProviderCaller<'a> {
    pub fn new(set: &'a ProviderSet) -> Self {
        Self::resume(set, CallerCursor::default())
    }

    /// Continue from an earlier caller's cursor.
    pub fn resume(set: &'a ProviderSet, mut cursor: CallerCursor) -> Self {
        let last = set.models().len().saturating_sub(1);
        if cursor.model_position > last {
            tracing::warn!(
                position = cursor.model_position,
                models = set.models().len(),
                "Cursor beyond the model chain, clamping to the last model"
            );
            cursor.model_position = last;
        }
        Self { set, cursor }
    }

    /// Hand back the cursor for a later caller.
    pub fn into_cursor(self) -> CallerCursor {
        self.cursor
    }

    /// The chain model currently selected
    pub fn current_model(&self) -> &str {
        &self.set.models().rank()[self.cursor.model_position].model_id
    }

    /// The provider currently selected, if any remain
    pub fn current_provider(&self) -> Option<&'a Arc<dyn LlmProvider>> {
        self.set.providers().get(self.cursor.provider_index)
    }

    pub fn is_dry_run(&self) -> bool {
        self.set.is_dry_run()
    }

    /// Generate text for one request, degrading across models and providers.
    pub async fn generate(
        &mut self,
        prompt_id: &str,
        system: &str,
        user: &str,
        options: &GenerateOptions,
        stats: &mut RunStats,
    ) -> Result<GeneratedText, CallFailure> {
        if self.set.is_dry_run() {
            tracing::debug!(prompt = prompt_id, "Dry run, skipping generation call");
            return Ok(GeneratedText::new(DRY_RUN_TEXT, "dry-run").parse_structured(options.structured));
        }

        loop {
            let Some(provider) = self.current_provider() else {
                return Err(CallFailure::Fatal(LlmError::ProviderUnavailable {
                    message: "every provider has failed".to_string(),
                }));
            };

            let failure = match self.generate_with(provider, prompt_id, system, user, options, stats).await {
                Ok(text) => return Ok(text),
                Err(failure) => failure,
            };

            match self.set.providers().get(self.cursor.provider_index + 1) {
                Some(next) => {
                    tracing::warn!(
                        from = provider.name(),
                        to = next.name(),
                        error = %failure,
                        "Provider failed, falling back"
                    );
                    stats.record_transition(
                        TransitionKind::Provider,
                        provider.name(),
                        next.name(),
                        failure.to_string(),
                    );
                    self.cursor.provider_index += 1;
                }
                None => return Err(failure),
            }
        }
    }

    async fn generate_with(
        &mut self,
        provider: &Arc<dyn LlmProvider>,
        prompt_id: &str,
        system: &str,
        user: &str,
        options: &GenerateOptions,
        stats: &mut RunStats,
    ) -> Result<GeneratedText, CallFailure> {
        let policy = self.set.policy().clone();
        let chain_bound = provider.uses_model_chain();
        let mut transient_retries = 0u32;
        let mut rate_limit_waits = 0u32;

        loop {
            let (clock_key, delay, call_options) = if chain_bound {
                let model = self.set.models().rank()[self.cursor.model_position].clone();
                let delay = model.delay(policy.paid_tier);
                let call_options = GenerateOptions {
                    model: Some(model.model_id.clone()),
                    ..options.clone()
                };
                (model.model_id, delay, call_options)
            } else {
                (provider.name().to_string(), Duration::ZERO, options.clone())
            };

            self.wait_for_slot(&clock_key, delay).await;
            self.cursor.last_call.insert(clock_key.clone(), Instant::now());
            let started_at = Utc::now();

            tracing::debug!(prompt = prompt_id, model = %clock_key, "Calling provider");
            let err = match provider.generate(system, user, &call_options).await {
                Ok(text) => {
                    stats.record_attempt(&clock_key, prompt_id, started_at, AttemptOutcome::Success);
                    stats.record_success(text.usage);
                    tracing::debug!(
                        prompt = prompt_id,
                        model = %text.model,
                        tokens = text.usage.total_tokens(),
                        "Generation succeeded"
                    );
                    return Ok(text);
                }
                Err(err) => err,
            };
            stats.record_attempt(&clock_key, prompt_id, started_at, AttemptOutcome::from(err.kind()));

            match err.kind() {
                FailureKind::RateLimited => {
                    if chain_bound {
                        if let Some(next) = self.advance_model(stats, &err) {
                            tracing::warn!(
                                from = %clock_key,
                                to = %next,
                                "Model rate limited, falling back"
                            );
                            continue;
                        }
                    }
                    if rate_limit_waits >= policy.max_rate_limit_waits {
                        tracing::warn!(model = %clock_key, waits = rate_limit_waits, "Rate limit waits exhausted");
                        return Err(CallFailure::Exhausted(err));
                    }
                    rate_limit_waits += 1;
                    stats.rate_limit_waits += 1;
                    let wait = err.retry_after().unwrap_or(policy.rate_limit_wait);
                    tracing::warn!(
                        model = %clock_key,
                        attempt = rate_limit_waits,
                        wait_ms = wait.as_millis() as u64,
                        "Last model rate limited, waiting before retry"
                    );
                    sleep(wait).await;
                }
                FailureKind::Transient => {
                    if transient_retries >= policy.max_retries {
                        tracing::warn!(model = %clock_key, retries = transient_retries, error = %err, "Transient retries exhausted");
                        return Err(CallFailure::Exhausted(err));
                    }
                    transient_retries += 1;
                    stats.backoff_waits += 1;
                    let wait = policy.retry_base_delay * transient_retries;
                    tracing::warn!(
                        model = %clock_key,
                        attempt = transient_retries,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying after backoff"
                    );
                    sleep(wait).await;
                }
                FailureKind::Fatal => {
                    tracing::warn!(model = %clock_key, error = %err, "Fatal provider error");
                    return Err(CallFailure::Fatal(err));
                }
            }
        }
    }

    /// Move the cursor one step down the chain; `None` on the last model.
    fn advance_model(&mut self, stats: &mut RunStats, err: &LlmError) -> Option<String> {
        let current = self.current_model().to_string();
        let next = match self.set.models().next(&current) {
            Ok(next) => next?.model_id.clone(),
            Err(err) => {
                tracing::error!(error = %err, "Model cursor outside the chain");
                return None;
            }
        };
        self.cursor.model_position += 1;
        stats.record_transition(TransitionKind::Model, current, next.clone(), err.to_string());
        Some(next)
    }

    async fn wait_for_slot(&self, clock_key: &str, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        if let Some(last) = self.cursor.last_call.get(clock_key) {
            let ready = *last + delay;
            if ready > Instant::now() {
                tracing::debug!(
                    model = clock_key,
                    wait_ms = (ready - Instant::now()).as_millis() as u64,
                    "Spacing calls for rate limit"
                );
                sleep_until(ready).await;
            }
        }
    }
}
