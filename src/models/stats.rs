//! Run Statistics
//!
//! Per-run telemetry written by the orchestrator: calls, tokens, fallback
//! transitions, per-placeholder end states, and fields needing review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use report_narrator_core::{DanglingMarker, DocumentPath};
use report_narrator_llm::{FailureKind, UsageStats};

/// Outcome of one generation call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    RateLimited,
    TransientError,
    FatalError,
}

impl From<FailureKind> for AttemptOutcome {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::RateLimited => AttemptOutcome::RateLimited,
            FailureKind::Transient => AttemptOutcome::TransientError,
            FailureKind::Fatal => AttemptOutcome::FatalError,
        }
    }
}

/// One call made during the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    /// Model id, or provider name for secondaries
    pub model_or_provider: String,
    pub prompt_id: String,
    pub started_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Moved down the ranked model chain
    Model,
    /// Moved from one provider to the next
    Provider,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackTransition {
    pub kind: TransitionKind,
    pub from: String,
    pub to: String,
    pub reason: String,
}

/// End state of one placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderState {
    /// Generated, validated, and written
    Succeeded,
    /// Generated and written, with constraint warnings
    ValidationFailed,
    /// Transient retries or rate-limit waits ran out
    Exhausted,
    /// A fatal provider error or write failure
    Failed,
    /// No prompt definition for the field
    Skipped,
}

impl PlaceholderState {
    /// Whether the placeholder still carries its marker
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            PlaceholderState::Exhausted | PlaceholderState::Failed | PlaceholderState::Skipped
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderOutcome {
    pub path: DocumentPath,
    pub field_name: String,
    pub state: PlaceholderState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintWarning {
    pub path: DocumentPath,
    pub field_name: String,
    pub message: String,
}

/// Accumulator for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Generation calls made, whatever their outcome
    pub api_calls: u32,
    /// Generation calls that returned text
    pub successful_calls: u32,
    pub tokens: UsageStats,
    pub fallback_transitions: Vec<FallbackTransition>,
    /// Paths whose prompt requires human approval
    pub approval_required: Vec<DocumentPath>,
    pub outcomes: Vec<PlaceholderOutcome>,
    pub attempts: Vec<GenerationAttempt>,
    /// Sleeps taken on a throttled last model
    pub rate_limit_waits: u32,
    /// Sleeps taken before retrying a transient failure
    pub backoff_waits: u32,
    pub constraint_warnings: Vec<ConstraintWarning>,
    pub dangling_markers: Vec<DanglingMarker>,
    pub errors: Vec<String>,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            api_calls: 0,
            successful_calls: 0,
            tokens: UsageStats::default(),
            fallback_transitions: Vec::new(),
            approval_required: Vec::new(),
            outcomes: Vec::new(),
            attempts: Vec::new(),
            rate_limit_waits: 0,
            backoff_waits: 0,
            constraint_warnings: Vec::new(),
            dangling_markers: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn record_attempt(
        &mut self,
        model_or_provider: impl Into<String>,
        prompt_id: impl Into<String>,
        started_at: DateTime<Utc>,
        outcome: AttemptOutcome,
    ) {
        self.api_calls += 1;
        self.attempts.push(GenerationAttempt {
            model_or_provider: model_or_provider.into(),
            prompt_id: prompt_id.into(),
            started_at,
            outcome,
        });
    }

    /// Count a successful call and its token usage
    pub fn record_success(&mut self, usage: UsageStats) {
        self.successful_calls += 1;
        self.tokens.input_tokens += usage.input_tokens;
        self.tokens.output_tokens += usage.output_tokens;
    }

    pub fn record_transition(
        &mut self,
        kind: TransitionKind,
        from: impl Into<String>,
        to: impl Into<String>,
        reason: impl Into<String>,
    ) {
        self.fallback_transitions.push(FallbackTransition {
            kind,
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        });
    }

    pub fn record_outcome(
        &mut self,
        path: DocumentPath,
        field_name: impl Into<String>,
        state: PlaceholderState,
    ) {
        self.outcomes.push(PlaceholderOutcome {
            path,
            field_name: field_name.into(),
            state,
        });
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn require_approval(&mut self, path: DocumentPath) {
        if !self.approval_required.contains(&path) {
            self.approval_required.push(path);
        }
    }

    pub fn transitions_of(&self, kind: TransitionKind) -> usize {
        self.fallback_transitions
            .iter()
            .filter(|t| t.kind == kind)
            .count()
    }

    pub fn count_state(&self, state: PlaceholderState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    /// Placeholders left at their marker for the polisher to default
    pub fn degraded_fields(&self) -> Vec<&PlaceholderOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.state.is_unresolved())
            .collect()
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}
