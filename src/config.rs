//! Predictor configuration.
//!
//! Loaded from a TOML file; every field has a default, so an empty file is a
//! valid configuration. The core never reads the environment itself: callers
//! pass a lookup to [`PredictorConfig::apply_overrides`] (the CLI passes
//! `std::env::var`).
//!
//! # Overrides
//!
//! | Variable | Field |
//! |---|---|
//! | `PREDIKTOR_BACKEND` | `backend` |
//! | `PREDIKTOR_MODEL_PATH` | `model_path` |
//! | `PREDIKTOR_VOCAB_PATH` | `vocab_path` |
//! | `PREDIKTOR_DICTIONARY_PATH` | `dictionary_path` |
//! | `PREDIKTOR_STRATEGY` | `generation.strategy` |
//! | `PREDIKTOR_SEED` | `generation.seed` |
//! | `PREDIKTOR_MAX_CONCURRENT` | `limits.max_concurrent` |
//! | `PREDIKTOR_MAX_PENDING` | `limits.max_pending` |
//! | `PREDIKTOR_REQUEST_TIMEOUT_MS` | `limits.request_timeout_ms` |
//! | `PREDIKTOR_LOG_LEVEL` | `logging.level` |
//! | `PREDIKTOR_LOG_FORMAT` | `logging.format` |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{GenerationConfig, SamplingParams, SearchStrategy};
use crate::pipeline::{RerankConfig, ScoreNormalization};
use crate::scheduler::PoolConfig;
use crate::telemetry::{LogConfig, LogFormat};

/// Names of every override variable, for documentation and tests.
pub const OVERRIDE_KEYS: &[&str] = &[
    "PREDIKTOR_BACKEND",
    "PREDIKTOR_MODEL_PATH",
    "PREDIKTOR_VOCAB_PATH",
    "PREDIKTOR_DICTIONARY_PATH",
    "PREDIKTOR_STRATEGY",
    "PREDIKTOR_SEED",
    "PREDIKTOR_MAX_CONCURRENT",
    "PREDIKTOR_MAX_PENDING",
    "PREDIKTOR_REQUEST_TIMEOUT_MS",
    "PREDIKTOR_LOG_LEVEL",
    "PREDIKTOR_LOG_FORMAT",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Which language model implementation to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    /// JSON n-gram table with a plain-text vocabulary.
    #[default]
    Ngram,
    /// Quantized GGUF causal LM with a `tokenizer.json`. Needs the `candle`
    /// feature.
    Candle,
}

impl ModelBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ngram => "ngram",
            Self::Candle => "candle",
        }
    }
}

impl FromStr for ModelBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ngram" => Ok(Self::Ngram),
            "candle" => Ok(Self::Candle),
            other => Err(ConfigError::Invalid(format!("unknown backend {:?}", other))),
        }
    }
}

/// `[markers]` table: special tokens of a pretrained tokenizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerSettings {
    pub bos: String,
    pub eos: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unk: Option<String>,
}

impl Default for MarkerSettings {
    fn default() -> Self {
        Self {
            bos: crate::engine::BOS_PIECE.to_string(),
            eos: crate::engine::EOS_PIECE.to_string(),
            unk: Some(crate::engine::UNK_PIECE.to_string()),
        }
    }
}

/// `[generation]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub strategy: SearchStrategy,
    pub temperature: f32,
    pub top_k: usize,
    pub top_p: f32,
    pub seed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_budget: Option<f32>,
    pub right_context_lookahead: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let sampling = SamplingParams::default();
        Self {
            strategy: SearchStrategy::Beam,
            temperature: sampling.temperature,
            top_k: sampling.top_k,
            top_p: sampling.top_p,
            seed: sampling.seed,
            confidence_budget: sampling.confidence_budget,
            right_context_lookahead: 1,
        }
    }
}

impl GenerationSettings {
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            seed: self.seed,
            confidence_budget: self.confidence_budget,
        }
    }
}

/// `[limits]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_concurrent: usize,
    pub max_pending: usize,
    pub request_timeout_ms: u64,
    /// Bytes of document text accepted per request.
    pub max_context_bytes: usize,
    pub max_candidates_limit: usize,
    pub max_beam_width: usize,
    pub max_candidate_tokens_limit: usize,
    pub shutdown_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: num_cpus::get().max(1),
            max_pending: 64,
            request_timeout_ms: 5_000,
            max_context_bytes: 64 * 1024,
            max_candidates_limit: 50,
            max_beam_width: 64,
            max_candidate_tokens_limit: 32,
            shutdown_timeout_ms: 30_000,
        }
    }
}

impl LimitsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Full predictor configuration. Immutable once a `Predictor` is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub backend: ModelBackend,
    pub model_path: PathBuf,
    /// Defaults to `vocab.txt` (n-gram) or `tokenizer.json` (candle) next to
    /// the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocab_path: Option<PathBuf>,
    pub dictionary_path: PathBuf,
    /// Regex splitting text into words for morphological lookup.
    pub word_pattern: String,
    pub weight_model: f32,
    pub weight_morph: f32,
    pub normalization: ScoreNormalization,
    pub default_max_candidates: usize,
    pub default_beam_width: usize,
    pub default_max_candidate_tokens: usize,
    pub markers: MarkerSettings,
    pub generation: GenerationSettings,
    pub limits: LimitsConfig,
    pub logging: LogConfig,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        let rerank = RerankConfig::default();
        let generation = GenerationConfig::default();
        Self {
            backend: ModelBackend::Ngram,
            model_path: PathBuf::from("model.json"),
            vocab_path: None,
            dictionary_path: PathBuf::from("dictionary.tsv"),
            word_pattern: crate::engine::DEFAULT_WORD_PATTERN.to_string(),
            weight_model: rerank.weight_model,
            weight_morph: rerank.weight_morph,
            normalization: rerank.normalization,
            default_max_candidates: generation.max_candidates,
            default_beam_width: generation.beam_width,
            default_max_candidate_tokens: generation.max_candidate_tokens,
            markers: MarkerSettings::default(),
            generation: GenerationSettings::default(),
            limits: LimitsConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl PredictorConfig {
    /// Load from a TOML file. Relative paths inside the file are resolved
    /// against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &Path| if p.is_relative() { base.join(p) } else { p.to_path_buf() };
        self.model_path = join(&self.model_path);
        self.dictionary_path = join(&self.dictionary_path);
        self.vocab_path = self.vocab_path.as_deref().map(join);
        self.logging.output_path = self.logging.output_path.as_deref().map(join);
    }

    /// Vocabulary file to load.
    pub fn resolved_vocab_path(&self) -> PathBuf {
        let default_name = match self.backend {
            ModelBackend::Ngram => "vocab.txt",
            ModelBackend::Candle => "tokenizer.json",
        };
        match &self.vocab_path {
            Some(path) => path.clone(),
            None => self
                .model_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(default_name),
        }
    }

    /// Apply `PREDIKTOR_*` overrides. Unparseable numbers and unknown enum
    /// values are ignored; counts are floored at 1.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(backend) = get("PREDIKTOR_BACKEND").and_then(|v| v.parse().ok()) {
            self.backend = backend;
        }
        if let Some(v) = get("PREDIKTOR_MODEL_PATH") {
            self.model_path = PathBuf::from(v);
        }
        if let Some(v) = get("PREDIKTOR_VOCAB_PATH") {
            self.vocab_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("PREDIKTOR_DICTIONARY_PATH") {
            self.dictionary_path = PathBuf::from(v);
        }
        match get("PREDIKTOR_STRATEGY").as_deref() {
            Some("beam") => self.generation.strategy = SearchStrategy::Beam,
            Some("sample") => self.generation.strategy = SearchStrategy::Sample,
            _ => {}
        }
        if let Some(seed) = get("PREDIKTOR_SEED").and_then(|v| v.parse().ok()) {
            self.generation.seed = seed;
        }
        if let Some(n) = get("PREDIKTOR_MAX_CONCURRENT").and_then(|v| v.parse::<usize>().ok()) {
            self.limits.max_concurrent = n.max(1);
        }
        if let Some(n) = get("PREDIKTOR_MAX_PENDING").and_then(|v| v.parse::<usize>().ok()) {
            self.limits.max_pending = n;
        }
        if let Some(ms) = get("PREDIKTOR_REQUEST_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.limits.request_timeout_ms = ms.max(1);
        }
        if let Some(level) = get("PREDIKTOR_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = get("PREDIKTOR_LOG_FORMAT").and_then(|v| v.parse::<LogFormat>().ok()) {
            self.logging.format = format;
        }
    }

    /// Validate values. Weight choices that let model score outweigh full
    /// agreement are allowed but logged; see [`PredictorConfig::warnings`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if !(self.weight_model.is_finite() && self.weight_model >= 0.0) {
            return invalid("weight_model must be a non-negative number");
        }
        if !(self.weight_morph.is_finite() && self.weight_morph >= 0.0) {
            return invalid("weight_morph must be a non-negative number");
        }
        if self.word_pattern.is_empty() {
            return invalid("word_pattern must not be empty");
        }
        if self.markers.bos.is_empty() || self.markers.eos.is_empty() {
            return invalid("markers.bos and markers.eos must not be empty");
        }
        let limits = &self.limits;
        if limits.max_concurrent == 0 {
            return invalid("limits.max_concurrent must be >= 1");
        }
        if limits.request_timeout_ms == 0 {
            return invalid("limits.request_timeout_ms must be > 0");
        }
        if limits.max_context_bytes == 0 {
            return invalid("limits.max_context_bytes must be > 0");
        }
        if !(1..=limits.max_candidates_limit).contains(&self.default_max_candidates) {
            return invalid("default_max_candidates must be in 1..=limits.max_candidates_limit");
        }
        if !(1..=limits.max_beam_width).contains(&self.default_beam_width) {
            return invalid("default_beam_width must be in 1..=limits.max_beam_width");
        }
        if !(1..=limits.max_candidate_tokens_limit).contains(&self.default_max_candidate_tokens) {
            return invalid(
                "default_max_candidate_tokens must be in 1..=limits.max_candidate_tokens_limit",
            );
        }
        self.generation
            .sampling()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        for warning in self.warnings() {
            tracing::warn!(%warning, "questionable configuration");
        }
        Ok(())
    }

    /// Non-fatal findings about the configuration.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.rerank_config().agreement_dominates() {
            warnings.push(format!(
                "weight_model ({}) >= 0.5 * weight_morph ({}): unconstrained candidates can \
                 outrank fully agreeing ones",
                self.weight_model, self.weight_morph
            ));
        }
        if self.generation.strategy == SearchStrategy::Beam
            && self.default_beam_width < self.default_max_candidates
        {
            warnings.push(
                "default_beam_width < default_max_candidates: beam search may return fewer \
                 candidates than requested"
                    .to_string(),
            );
        }
        warnings
    }

    pub fn rerank_config(&self) -> RerankConfig {
        RerankConfig {
            weight_model: self.weight_model,
            weight_morph: self.weight_morph,
            normalization: self.normalization,
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_concurrent: self.limits.max_concurrent,
            max_pending: self.limits.max_pending,
        }
    }

    /// Generation settings for one request.
    pub fn generation_config(
        &self,
        max_candidates: usize,
        beam_width: usize,
        max_candidate_tokens: usize,
    ) -> GenerationConfig {
        GenerationConfig {
            strategy: self.generation.strategy,
            beam_width,
            max_candidate_tokens,
            max_candidates,
            right_context_lookahead: self.generation.right_context_lookahead.max(1),
            sampling: self.generation.sampling(),
        }
    }
}
