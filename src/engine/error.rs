//! Engine error types for the language-model side of the pipeline.
//!
//! All errors are fail-closed: a model fault aborts the whole generation,
//! partial beams are never handed back.

use thiserror::Error;

use super::tokenizer::TokenizerError;

/// Errors raised by a [`LanguageModel`](super::LanguageModel) backend.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model not loaded: {0}")]
    NotLoaded(String),

    #[error("Invalid model format: {0}")]
    InvalidFormat(String),

    #[error("Model references unknown vocabulary piece {0:?}")]
    UnknownPiece(String),

    #[error("Context token out of vocabulary range: {0}")]
    InvalidToken(u32),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Model backend failure: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the candidate generator.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Invalid generation config: {0}")]
    InvalidConfig(String),

    #[error("Model inference failed: {0}")]
    Model(#[from] ModelError),

    #[error("Candidate decode failed: {0}")]
    Decode(#[from] TokenizerError),

    #[error("Generation cancelled")]
    Cancelled,
}

impl GenerationError {
    /// Returns true if generation stopped because its token was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true if the failure came from the caller's parameters.
    pub fn is_invalid_config(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }
}
