//! Model Registry
//!
//! The ranked model chain used by the primary provider. Earlier entries are
//! preferred (higher quality, tighter rate limits); later entries are the
//! fallbacks taken when a model is throttled.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::{LlmError, LlmResult};

/// Coarse quality tier of a model in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Premium,
    Standard,
    Economy,
}

/// One entry of the ranked chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub model_id: String,
    pub tier: ModelTier,
    /// Minimum spacing between two calls to this model on the free tier
    pub min_delay_ms: u64,
    /// Free-tier request budget per minute
    pub rate_limit_per_minute: u32,
}

impl ModelDescriptor {
    pub fn new(
        model_id: impl Into<String>,
        tier: ModelTier,
        min_delay_ms: u64,
        rate_limit_per_minute: u32,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            tier,
            min_delay_ms,
            rate_limit_per_minute,
        }
    }

    /// Minimum spacing between consecutive calls.
    ///
    /// Free tier honors both the explicit minimum delay and the per-minute
    /// budget, whichever is stricter. Paid tier has no spacing.
    pub fn delay(&self, paid_tier: bool) -> Duration {
        if paid_tier {
            return Duration::ZERO;
        }
        let budget_ms = match self.rate_limit_per_minute {
            0 => 0,
            rpm => 60_000 / u64::from(rpm),
        };
        Duration::from_millis(self.min_delay_ms.max(budget_ms))
    }
}

/// Static, totally ordered model chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    /// Build a registry from a ranked list.
    ///
    /// The list must be non-empty and free of duplicate ids.
    pub fn new(models: Vec<ModelDescriptor>) -> LlmResult<Self> {
        if models.is_empty() {
            return Err(LlmError::InvalidRequest {
                message: "Model chain must contain at least one model".to_string(),
            });
        }
        for (i, model) in models.iter().enumerate() {
            if models[..i].iter().any(|m| m.model_id == model.model_id) {
                return Err(LlmError::InvalidRequest {
                    message: format!("Duplicate model in chain: {}", model.model_id),
                });
            }
        }
        Ok(Self { models })
    }

    /// The default Gemini chain with free-tier limits.
    pub fn default_gemini() -> Self {
        Self {
            models: vec![
                ModelDescriptor::new("gemini-2.5-pro", ModelTier::Premium, 12_000, 5),
                ModelDescriptor::new("gemini-2.5-flash", ModelTier::Standard, 6_000, 10),
                ModelDescriptor::new("gemini-2.5-flash-lite", ModelTier::Economy, 4_000, 15),
                ModelDescriptor::new("gemini-2.0-flash", ModelTier::Economy, 4_000, 15),
            ],
        }
    }

    /// Models in priority order
    pub fn rank(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// The most preferred model
    pub fn first(&self) -> &ModelDescriptor {
        &self.models[0]
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.model_id == model_id)
    }

    /// Rank position of a model (0 = most preferred)
    pub fn position(&self, model_id: &str) -> Option<usize> {
        self.models.iter().position(|m| m.model_id == model_id)
    }

    /// The model ranked right after `current`; `None` when `current` is last.
    ///
    /// A model outside the chain is `UnknownModel`.
    pub fn next(&self, current: &str) -> LlmResult<Option<&ModelDescriptor>> {
        let position = self.position(current).ok_or_else(|| LlmError::UnknownModel {
            model: current.to_string(),
        })?;
        Ok(self.models.get(position + 1))
    }

    /// Minimum spacing between two consecutive calls to `model_id`.
    pub fn delay_for(&self, model_id: &str, paid_tier: bool) -> LlmResult<Duration> {
        self.get(model_id)
            .map(|m| m.delay(paid_tier))
            .ok_or_else(|| LlmError::UnknownModel {
                model: model_id.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::default_gemini()
    }
}
