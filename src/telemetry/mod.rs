//! Telemetry for the prediction core.
//!
//! Structured logging, request spans and metrics. Nothing here opens a
//! network connection; exporting is left to the embedding service.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    init_metrics, record_candidates, record_pool_wait, record_request_failure,
    record_request_success,
};
pub use spans::{RequestSpan, SpanExt};
