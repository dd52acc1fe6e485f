//! Caller-visible prediction errors.
//!
//! Every failure names the pipeline stage it happened in. Generation details
//! stay in the logs; callers only see the category.

use std::fmt;

use thiserror::Error;

/// Pipeline stage a request was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validate,
    Tokenize,
    Analyze,
    Generate,
    Filter,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Tokenize => "tokenize",
            Self::Analyze => "analyze",
            Self::Generate => "generate",
            Self::Filter => "filter",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure categories.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredictErrorKind {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("text cannot be encoded: {0}")]
    Encoding(String),

    #[error("candidate generation failed")]
    Generation,

    #[error("no candidates produced")]
    EmptyResult,

    #[error("request deadline exceeded")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("service overloaded")]
    Overloaded,

    #[error("service shutting down")]
    ShuttingDown,
}

impl PredictErrorKind {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::Encoding(_) => "encoding",
            Self::Generation => "generation",
            Self::EmptyResult => "empty_result",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Overloaded => "overloaded",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} (stage: {stage})")]
pub struct PredictError {
    pub stage: Stage,
    pub kind: PredictErrorKind,
}

impl PredictError {
    pub fn new(stage: Stage, kind: PredictErrorKind) -> Self {
        Self { stage, kind }
    }

    pub fn invalid(stage: Stage, reason: impl Into<String>) -> Self {
        Self::new(stage, PredictErrorKind::InvalidRequest(reason.into()))
    }

    /// The caller sent something that will never succeed as-is.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind,
            PredictErrorKind::InvalidRequest(_) | PredictErrorKind::Encoding(_)
        )
    }

    /// Retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            PredictErrorKind::Generation
                | PredictErrorKind::Timeout
                | PredictErrorKind::Overloaded
                | PredictErrorKind::ShuttingDown
        )
    }
}
