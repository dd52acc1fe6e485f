//! Per-request infilling pipeline.
//!
//! validate → tokenize → derive constraints → acquire permit → generate on a
//! blocking worker → rerank → truncate. The request deadline and the
//! caller's cancellation token are checked at every await point; generation
//! is all-or-nothing and nothing is retried.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::{sleep_until, Instant as Deadline};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn, Instrument};
use uuid::Uuid;

use super::error::{PredictError, PredictErrorKind, Stage};
use super::request::{InfillRequest, InfillResponse, Prediction};
use super::rerank::Reranker;
use crate::config::PredictorConfig;
use crate::engine::{
    CandidateGenerator, GenerationConfig, GenerationError, InfillContext, LanguageModel,
    Tokenizer, WordSegmenter,
};
use crate::morph::{ConstraintSet, MorphOracle};
use crate::scheduler::{ExecutionPool, PoolError};
use crate::telemetry::{self, RequestSpan, SpanExt};

/// Words before the gap that constraint derivation looks at.
const PRECEDING_WORDS: usize = 2;

/// Request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Tokenized,
    Generated,
    Filtered,
    Completed,
    Failed(Stage),
}

/// Read-only resources shared by every request.
pub struct PipelineResources {
    pub tokenizer: Arc<Tokenizer>,
    pub model: Arc<dyn LanguageModel>,
    pub oracle: Arc<MorphOracle>,
    pub segmenter: WordSegmenter,
    pub pool: ExecutionPool,
    pub config: Arc<PredictorConfig>,
}

/// Drives one request through the pipeline.
pub struct InfillOrchestrator {
    resources: Arc<PipelineResources>,
    request_id: Uuid,
    state: RequestState,
}

/// Limits after applying defaults.
struct Effective {
    max_candidates: usize,
    generation: GenerationConfig,
}

impl InfillOrchestrator {
    pub fn new(resources: Arc<PipelineResources>) -> Self {
        Self {
            resources,
            request_id: Uuid::new_v4(),
            state: RequestState::Received,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub async fn run(
        &mut self,
        request: InfillRequest,
        cancel: &CancellationToken,
    ) -> Result<InfillResponse, PredictError> {
        let started = Instant::now();
        let deadline = Deadline::now() + self.resources.config.limits.request_timeout();
        let span = RequestSpan::new(&self.request_id, self.resources.model.model_id());

        let result = self.execute(request, cancel, deadline).instrument(span.clone()).await;

        let latency = started.elapsed();
        span.record_result(&result);
        span.record("latency_ms", latency.as_millis() as u64);
        match &result {
            Ok(response) => {
                self.state = RequestState::Completed;
                span.record("candidates", response.predictions.len());
                telemetry::record_request_success(latency, response.predictions.len());
            }
            Err(e) => {
                self.state = RequestState::Failed(e.stage);
                span.in_scope(|| {
                    warn!(stage = %e.stage, kind = e.kind.label(), error = %e, "request failed")
                });
                telemetry::record_request_failure(latency, e.kind.label(), e.stage.as_str());
            }
        }
        result
    }

    async fn execute(
        &mut self,
        request: InfillRequest,
        cancel: &CancellationToken,
        deadline: Deadline,
    ) -> Result<InfillResponse, PredictError> {
        let resources = Arc::clone(&self.resources);
        let effective = self.effective_limits(&request)?;
        let gap = request.resolve(&resources.segmenter)?;
        if cancel.is_cancelled() {
            return Err(PredictError::new(Stage::Validate, PredictErrorKind::Cancelled));
        }

        let encode = |text: &str| {
            resources.tokenizer.encode_ids(text).map_err(|e| {
                PredictError::new(Stage::Tokenize, PredictErrorKind::Encoding(e.to_string()))
            })
        };
        let left_ids = encode(gap.left)?;
        let right_ids = encode(gap.right)?;
        self.state = RequestState::Tokenized;
        debug!(left_tokens = left_ids.len(), right_tokens = right_ids.len(), "tokenized");

        let preceding_spans = resources.segmenter.segment(gap.left);
        let preceding: Vec<&str> = preceding_spans
            .iter()
            .skip(preceding_spans.len().saturating_sub(PRECEDING_WORDS))
            .map(|w| w.text.as_str())
            .collect();
        let following_spans = resources.segmenter.segment(gap.right);
        let following = following_spans.first().map(|w| w.text.as_str());
        let constraints = ConstraintSet::derive(&resources.oracle, &preceding, following);
        debug!(constraints = constraints.len(), "constraints derived");

        let wait_started = Instant::now();
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(PredictError::new(Stage::Generate, PredictErrorKind::Cancelled));
            }
            _ = sleep_until(deadline) => {
                return Err(PredictError::new(Stage::Generate, PredictErrorKind::Timeout));
            }
            acquired = resources.pool.acquire() => acquired.map_err(|e| {
                let kind = match e {
                    PoolError::Overloaded { .. } => PredictErrorKind::Overloaded,
                    PoolError::Closed => PredictErrorKind::ShuttingDown,
                };
                PredictError::new(Stage::Generate, kind)
            })?,
        };
        telemetry::record_pool_wait(wait_started.elapsed());

        let worker_cancel = cancel.child_token();
        let _stop_worker = worker_cancel.clone().drop_guard();
        let prefix = gap.prefix.to_string();
        let generation = effective.generation;
        let shared = Arc::clone(&resources);
        let worker = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let input = InfillContext {
                left: &left_ids,
                right: &right_ids,
                prefix: &prefix,
            };
            CandidateGenerator::new(shared.model.as_ref(), &shared.tokenizer, &generation)
                .generate(&input, &worker_cancel)
        });

        let joined = tokio::select! {
            joined = worker => joined,
            _ = cancel.cancelled() => {
                return Err(PredictError::new(Stage::Generate, PredictErrorKind::Cancelled));
            }
            _ = sleep_until(deadline) => {
                return Err(PredictError::new(Stage::Generate, PredictErrorKind::Timeout));
            }
        };

        let candidates = match joined {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(GenerationError::Cancelled)) => {
                let kind = if Deadline::now() >= deadline {
                    PredictErrorKind::Timeout
                } else {
                    PredictErrorKind::Cancelled
                };
                return Err(PredictError::new(Stage::Generate, kind));
            }
            Ok(Err(GenerationError::InvalidConfig(reason))) => {
                return Err(PredictError::invalid(Stage::Validate, reason));
            }
            Ok(Err(e)) => {
                error!(error = %e, "candidate generation failed");
                return Err(PredictError::new(Stage::Generate, PredictErrorKind::Generation));
            }
            Err(e) => {
                error!(error = %e, "generation worker did not complete");
                return Err(PredictError::new(Stage::Generate, PredictErrorKind::Generation));
            }
        };
        if candidates.is_empty() {
            return Err(PredictError::new(Stage::Generate, PredictErrorKind::EmptyResult));
        }
        self.state = RequestState::Generated;
        let generated = candidates.len();
        debug!(generated, "candidates generated");

        let rerank_config = resources.config.rerank_config();
        let outcome = Reranker::new(&resources.oracle, &resources.segmenter, &rerank_config)
            .rerank(candidates, &constraints);
        telemetry::record_candidates(generated, outcome.dropped);
        if outcome.ranked.is_empty() {
            return Err(PredictError::new(Stage::Filter, PredictErrorKind::EmptyResult));
        }
        self.state = RequestState::Filtered;
        debug!(kept = outcome.ranked.len(), dropped = outcome.dropped, "candidates reranked");

        let predictions: Vec<Prediction> = outcome
            .ranked
            .into_iter()
            .take(effective.max_candidates)
            .map(Prediction::from)
            .collect();

        Ok(InfillResponse {
            request_id: self.request_id,
            replace_range: gap.replace,
            predictions,
        })
    }

    fn effective_limits(&self, request: &InfillRequest) -> Result<Effective, PredictError> {
        let config = &self.resources.config;
        let limits = &config.limits;

        if request.document.len() > limits.max_context_bytes {
            return Err(PredictError::invalid(
                Stage::Validate,
                format!(
                    "document is {} bytes, limit is {}",
                    request.document.len(),
                    limits.max_context_bytes
                ),
            ));
        }

        let bounded = |name: &str, value: Option<usize>, default: usize, max: usize| {
            let value = value.unwrap_or(default);
            if (1..=max).contains(&value) {
                Ok(value)
            } else {
                Err(PredictError::invalid(
                    Stage::Validate,
                    format!("{name} must be in 1..={max}, got {value}"),
                ))
            }
        };
        let max_candidates = bounded(
            "max_candidates",
            request.max_candidates,
            config.default_max_candidates,
            limits.max_candidates_limit,
        )?;
        let beam_width = bounded(
            "beam_width",
            request.beam_width,
            config.default_beam_width,
            limits.max_beam_width,
        )?;
        let max_tokens = bounded(
            "max_candidate_tokens",
            request.max_candidate_tokens,
            config.default_max_candidate_tokens,
            limits.max_candidate_tokens_limit,
        )?;

        // The reranker may reorder, so generate at least a beam's worth.
        let generation =
            config.generation_config(max_candidates.max(beam_width), beam_width, max_tokens);
        generation
            .validate()
            .map_err(|e| PredictError::invalid(Stage::Validate, e.to_string()))?;

        Ok(Effective { max_candidates, generation })
    }
}
