//! Request span helpers.

use tracing::{info_span, Span};
use uuid::Uuid;

/// Extension trait for recording outcomes on spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for prediction request spans.
pub struct RequestSpan;

impl RequestSpan {
    /// Span with `request_id` and `model_id` set; `status`, `error.message`,
    /// `latency_ms` and `candidates` are filled in on completion.
    pub fn new(request_id: &Uuid, model_id: &str) -> Span {
        info_span!(
            "predict_request",
            request_id = %request_id,
            model_id = %model_id,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            candidates = tracing::field::Empty,
        )
    }
}
