//! Output Polisher
//!
//! Final cleanup of the rendered report. An optional model pass asks for a
//! quality cleanup and is accepted only when the result keeps the output
//! format's structural markers. The deterministic rules always run after it
//! and cannot fail, so no marker or sentinel text survives into delivery.

pub mod rules;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use report_narrator_core::strip_code_fences;
use report_narrator_llm::GenerateOptions;

use crate::models::settings::PolishSettings;
use crate::models::stats::RunStats;
use crate::services::generation::{CallerCursor, ProviderSet};

pub use rules::{default_sentence, NEUTRAL_EVIDENCE_TEXT};

/// Change-log type reported when the text was already clean
pub const NO_CHANGES: &str = "no_changes";

/// Change-log type for an accepted model cleanup
pub const MODEL_POLISH: &str = "model_polish";

const POLISH_SYSTEM: &str = "You are a copy editor for business reports. Fix residual text-quality issues (grammar, repeated words, awkward phrasing, leftover template artifacts) without changing the structure, keys, or markup. Return only the corrected text.";

/// One kind of transformation applied, aggregated over the whole text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: usize,
    pub reason: String,
}

impl ChangeLogEntry {
    fn no_changes() -> Self {
        Self {
            kind: NO_CHANGES.to_string(),
            count: 0,
            reason: "Text was already clean".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolishResult {
    pub text: String,
    pub change_log: Vec<ChangeLogEntry>,
}

impl PolishResult {
    /// Whether anything was changed
    pub fn changed(&self) -> bool {
        !self.change_log.iter().all(|entry| entry.kind == NO_CHANGES)
    }
}

/// Final text cleanup with an optional model pass
#[derive(Debug, Clone)]
pub struct OutputPolisher {
    providers: Option<Arc<ProviderSet>>,
    settings: PolishSettings,
}

impl OutputPolisher {
    /// A polisher that only runs the deterministic rules.
    pub fn deterministic() -> Self {
        Self {
            providers: None,
            settings: PolishSettings {
                model_pass: false,
                ..Default::default()
            },
        }
    }

    pub fn new(providers: Arc<ProviderSet>, settings: PolishSettings) -> Self {
        Self {
            providers: Some(providers),
            settings,
        }
    }

    /// Polish `text` as a standalone step, starting from the top of the chain.
    pub async fn polish(&self, text: &str) -> PolishResult {
        let mut stats = RunStats::new();
        let mut cursor = CallerCursor::default();
        self.polish_tracked(text, &mut stats, &mut cursor).await
    }

    /// Polish `text` as the last step of a run.
    ///
    /// The model pass continues from the run's `cursor`, so it never returns
    /// to a model the run already left and honors its spacing clock. The
    /// call is recorded in `stats` and the cursor is updated.
    pub async fn polish_tracked(
        &self,
        text: &str,
        stats: &mut RunStats,
        cursor: &mut CallerCursor,
    ) -> PolishResult {
        let mut change_log = Vec::new();
        let mut current = text.to_string();

        if let Some(cleaned) = self.model_pass(text, stats, cursor).await {
            if cleaned != current {
                change_log.push(ChangeLogEntry {
                    kind: MODEL_POLISH.to_string(),
                    count: 1,
                    reason: "Model cleanup accepted".to_string(),
                });
                current = cleaned;
            }
        }

        let deterministic = polish_deterministic(&current);
        change_log.extend(
            deterministic
                .change_log
                .into_iter()
                .filter(|entry| entry.kind != NO_CHANGES),
        );
        if change_log.is_empty() {
            change_log.push(ChangeLogEntry::no_changes());
        }

        PolishResult {
            text: deterministic.text,
            change_log,
        }
    }

    /// The model cleanup, or `None` when skipped, failed, or rejected.
    async fn model_pass(
        &self,
        text: &str,
        stats: &mut RunStats,
        cursor: &mut CallerCursor,
    ) -> Option<String> {
        let providers = self.providers.as_ref()?;
        if !self.settings.model_pass || providers.is_dry_run() || text.trim().is_empty() {
            return None;
        }

        let policy = providers.policy();
        let options = GenerateOptions {
            model: None,
            temperature: Some(policy.temperature.min(0.2)),
            max_output_tokens: Some(policy.max_output_tokens.max(estimate_tokens(text))),
            max_retries: policy.max_retries,
            structured: false,
        };

        let mut caller = providers.resume(std::mem::take(cursor));
        let result = caller.generate("polish", POLISH_SYSTEM, text, &options, stats).await;
        *cursor = caller.into_cursor();
        let generated = match result {
            Ok(generated) => generated,
            Err(failure) => {
                tracing::warn!(error = %failure, "Model polish failed, using deterministic rules only");
                return None;
            }
        };

        let cleaned = strip_code_fences(&generated.text);
        let missing: Vec<&str> = self
            .settings
            .required_markers
            .iter()
            .map(String::as_str)
            .filter(|marker| !cleaned.contains(marker))
            .collect();
        if cleaned.is_empty() || !missing.is_empty() {
            tracing::warn!(missing = ?missing, "Model polish dropped required structure, discarding");
            return None;
        }
        Some(cleaned)
    }
}

/// Rough output budget for echoing `text` back
fn estimate_tokens(text: &str) -> u32 {
    u32::try_from(text.len() / 3 + 256).unwrap_or(u32::MAX)
}

/// Apply every rule until the text stops changing.
///
/// Terminates because every changing pass removes a `[` or a sentinel, or
/// shortens the text (see `rules`). The result is therefore a fixed point
/// and polishing it again changes nothing. Counts are aggregated per rule
/// across passes. Clean input yields a single `no_changes` entry.
pub fn polish_deterministic(text: &str) -> PolishResult {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut current = text.to_string();

    let mut passes = 0usize;
    loop {
        passes += 1;
        let mut changed = false;
        for rule in rules::RULES {
            let (next, count) = (rule.apply)(&current);
            if count > 0 && next != current {
                *counts.entry(rule.kind).or_insert(0) += count;
                current = next;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    tracing::trace!(passes, "Polish rules settled");

    let mut change_log: Vec<ChangeLogEntry> = rules::RULES
        .iter()
        .filter_map(|rule| {
            counts.get(rule.kind).map(|count| ChangeLogEntry {
                kind: rule.kind.to_string(),
                count: *count,
                reason: rule.reason.to_string(),
            })
        })
        .collect();
    if change_log.is_empty() {
        change_log.push(ChangeLogEntry::no_changes());
    }

    for entry in &change_log {
        tracing::debug!(kind = %entry.kind, count = entry.count, "Polish change");
    }

    PolishResult {
        text: current,
        change_log,
    }
}
