//! Infilling candidate pipeline.
//!
//! Turns a document with a gap into ranked completions: the orchestrator
//! runs generation on the engine, then scores every fill against the
//! agreement constraints of its neighbours and reranks.

mod candidate;
mod error;
mod orchestrator;
mod request;
mod rerank;

pub use candidate::{Candidate, MorphFit, ScoredCandidate};
pub use error::{PredictError, PredictErrorKind, Stage};
pub use orchestrator::{InfillOrchestrator, PipelineResources, RequestState};
pub use request::{InfillRequest, InfillResponse, Prediction, ResolvedGap, Span};
pub use rerank::{
    RerankConfig, RerankOutcome, Reranker, ScoreNormalization, UNCONSTRAINED_SCORE,
};
