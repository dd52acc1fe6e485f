//! Generation configuration for the candidate generator.
//!
//! All fields have safe defaults. Configuration is validated before use.

use serde::{Deserialize, Serialize};

use super::error::GenerationError;

/// How candidate fills are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Deterministic beam search.
    #[default]
    Beam,
    /// Independent seeded samples.
    Sample,
}

/// Knobs used only by [`SearchStrategy::Sample`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Temperature applied before sampling (must be > 0.0)
    pub temperature: f32,
    /// Top-k sampling limit (0 = disabled)
    pub top_k: usize,
    /// Top-p (nucleus) threshold (1.0 = disabled)
    pub top_p: f32,
    /// Seed for the per-request RNG
    pub seed: u64,
    /// Stop a fill once this much confidence has been spent. None = never.
    pub confidence_budget: Option<f32>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_k: 40,
            top_p: 1.0,
            seed: 42,
            confidence_budget: None,
        }
    }
}

/// Per-request generation configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub strategy: SearchStrategy,
    /// Partial fills kept per step (beam) or samples drawn (sample)
    pub beam_width: usize,
    /// Hard cap on tokens in one fill
    pub max_candidate_tokens: usize,
    /// Upper bound on returned candidates
    pub max_candidates: usize,
    /// Right-context tokens scored when a fill meets the right context
    pub right_context_lookahead: usize,
    pub sampling: SamplingParams,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::Beam,
            beam_width: 8,
            max_candidate_tokens: 4,
            max_candidates: 5,
            right_context_lookahead: 1,
            sampling: SamplingParams::default(),
        }
    }
}

impl GenerationConfig {
    /// Validate configuration values. Returns error on invalid values.
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.beam_width == 0 {
            return Err(GenerationError::InvalidConfig("beam_width must be >= 1".into()));
        }
        if self.max_candidate_tokens == 0 {
            return Err(GenerationError::InvalidConfig(
                "max_candidate_tokens must be >= 1".into(),
            ));
        }
        if self.max_candidates == 0 {
            return Err(GenerationError::InvalidConfig("max_candidates must be >= 1".into()));
        }
        self.sampling.validate()
    }
}

impl SamplingParams {
    pub fn validate(&self) -> Result<(), GenerationError> {
        if !(self.temperature > 0.0 && self.temperature <= 2.0) {
            return Err(GenerationError::InvalidConfig(
                "temperature must be in range (0.0, 2.0]".into(),
            ));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(GenerationError::InvalidConfig(
                "top_p must be in range (0.0, 1.0]".into(),
            ));
        }
        if let Some(budget) = self.confidence_budget {
            if !(budget.is_finite() && budget > 0.0) {
                return Err(GenerationError::InvalidConfig(
                    "confidence_budget must be a positive number".into(),
                ));
            }
        }
        Ok(())
    }
}
