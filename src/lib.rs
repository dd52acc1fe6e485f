//! Prediktor core: morphology-aware text infilling.
//!
//! Given a document with a gap or a cursor, proposes completions that are
//! likely under a language model and agree grammatically with the words
//! around the gap.
//!
//! # Pipeline
//!
//! - **Tokenize**: text to vocabulary ids, with word alignment
//! - **Constrain**: agreement constraints from neighbouring words
//! - **Generate**: beam search or seeded sampling over the model
//! - **Rerank**: fuse model and morphology scores, drop disagreeing fills
//!
//! Model, tokenizer and dictionary are loaded once and shared read-only by
//! every request. Requests run concurrently up to a bounded number of
//! generation workers.

pub mod cli;
pub mod config;
pub mod engine;
pub mod morph;
pub mod pipeline;
pub mod scheduler;
pub mod shutdown;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use config::{ConfigError, ModelBackend, PredictorConfig};
pub use pipeline::{
    InfillRequest, InfillResponse, PredictError, PredictErrorKind, Prediction, Stage,
};

use engine::{LanguageModel, ModelError, NgramModel, Tokenizer, TokenizerError, WordSegmenter};
use morph::{DictionaryError, MorphOracle};
use pipeline::{InfillOrchestrator, PipelineResources};
use scheduler::ExecutionPool;
use shutdown::{ShutdownCoordinator, ShutdownResult};

/// Failures while building a [`Predictor`].
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Dictionary error: {0}")]
    Dictionary(#[from] DictionaryError),

    #[error("Model vocabulary has {model} entries, tokenizer has {tokenizer}")]
    VocabMismatch { model: usize, tokenizer: usize },

    #[error("Backend {0:?} is not compiled in (enable the `{0}` feature)")]
    BackendUnavailable(&'static str),
}

fn load_backend(
    config: &PredictorConfig,
) -> Result<(Tokenizer, Arc<dyn LanguageModel>), LoadError> {
    let vocab_path = config.resolved_vocab_path();
    match config.backend {
        ModelBackend::Ngram => {
            let tokenizer = Tokenizer::from_file(&vocab_path)?;
            let model = NgramModel::from_file(&config.model_path, &tokenizer)?;
            info!(order = model.order(), "n-gram model loaded");
            Ok((tokenizer, Arc::new(model)))
        }
        #[cfg(feature = "candle")]
        ModelBackend::Candle => {
            let tokenizer = engine::load_tokenizer(&vocab_path, &config.markers)?;
            let model = engine::CandleModel::from_gguf(&config.model_path, &tokenizer)?;
            Ok((tokenizer, Arc::new(model)))
        }
        #[cfg(not(feature = "candle"))]
        ModelBackend::Candle => Err(LoadError::BackendUnavailable("candle")),
    }
}

/// Loaded predictor. Cheap to share behind an `Arc`; every method takes
/// `&self`.
pub struct Predictor {
    resources: Arc<PipelineResources>,
    shutdown: ShutdownCoordinator,
}

impl Predictor {
    /// Validate `config` and load the tokenizer, model and dictionary it
    /// names.
    pub fn load(config: PredictorConfig) -> Result<Self, LoadError> {
        config.validate()?;
        let vocab_path = config.resolved_vocab_path();
        let (tokenizer, model) = load_backend(&config)?;
        let oracle = MorphOracle::from_file(&config.dictionary_path)?;
        info!(
            backend = config.backend.as_str(),
            model = %config.model_path.display(),
            vocab = %vocab_path.display(),
            vocab_size = tokenizer.vocab_size(),
            dictionary_entries = oracle.dictionary().len(),
            "predictor resources loaded"
        );
        Self::from_parts(config, tokenizer, model, oracle)
    }

    /// Assemble a predictor from already loaded parts.
    pub fn from_parts(
        config: PredictorConfig,
        tokenizer: Tokenizer,
        model: Arc<dyn LanguageModel>,
        oracle: MorphOracle,
    ) -> Result<Self, LoadError> {
        config.validate()?;
        if model.vocab_size() != tokenizer.vocab_size() {
            return Err(LoadError::VocabMismatch {
                model: model.vocab_size(),
                tokenizer: tokenizer.vocab_size(),
            });
        }
        let segmenter = WordSegmenter::with_pattern(&config.word_pattern)?;
        let pool = ExecutionPool::new(config.pool_config());

        Ok(Self {
            resources: Arc::new(PipelineResources {
                tokenizer: Arc::new(tokenizer),
                model,
                oracle: Arc::new(oracle),
                segmenter,
                pool,
                config: Arc::new(config),
            }),
            shutdown: ShutdownCoordinator::new(),
        })
    }

    /// Rank completions for the gap between `left` and `right`. Unset
    /// limits fall back to the configured defaults.
    pub async fn predict(
        &self,
        left: &str,
        right: &str,
        max_candidates: Option<usize>,
        beam_width: Option<usize>,
        max_candidate_tokens: Option<usize>,
    ) -> Result<Vec<Prediction>, PredictError> {
        let mut request = InfillRequest::gap(left, right);
        request.max_candidates = max_candidates;
        request.beam_width = beam_width;
        request.max_candidate_tokens = max_candidate_tokens;
        let response = self.predict_request(request, CancellationToken::new()).await?;
        Ok(response.predictions)
    }

    /// Run a full request. Cancelling `cancel` aborts it with
    /// [`PredictErrorKind::Cancelled`]; no partial results are returned.
    pub async fn predict_request(
        &self,
        request: InfillRequest,
        cancel: CancellationToken,
    ) -> Result<InfillResponse, PredictError> {
        let Some(_in_flight) = self.shutdown.track() else {
            return Err(PredictError::new(Stage::Validate, PredictErrorKind::ShuttingDown));
        };

        let token = cancel.child_token();
        let drain = self.shutdown.cancelled_token();
        let mut orchestrator = InfillOrchestrator::new(Arc::clone(&self.resources));
        let run = orchestrator.run(request, &token);
        tokio::pin!(run);

        let result = tokio::select! {
            biased;
            result = &mut run => result,
            _ = drain.cancelled() => {
                token.cancel();
                run.await
            }
        };

        match result {
            Err(e) if drain.is_cancelled() && e.kind == PredictErrorKind::Cancelled => {
                Err(PredictError::new(e.stage, PredictErrorKind::ShuttingDown))
            }
            other => other,
        }
    }

    /// Stop admitting requests, wait up to `timeout` for in-flight ones,
    /// cancel the rest, then close the execution pool.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownResult {
        let result = self.shutdown.initiate(timeout).await;
        self.resources.pool.close();
        info!(?result, "predictor stopped");
        result
    }

    pub fn is_accepting(&self) -> bool {
        self.shutdown.is_accepting()
    }

    pub fn in_flight(&self) -> u32 {
        self.shutdown.in_flight_count()
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.resources.config
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.resources.tokenizer
    }

    pub fn oracle(&self) -> &MorphOracle {
        &self.resources.oracle
    }

    pub fn model_id(&self) -> &str {
        self.resources.model.model_id()
    }
}
