//! Metrics facade wrappers.
//!
//! Recording goes through the `metrics` crate; without an installed
//! recorder every call is a no-op.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

pub const REQUESTS_TOTAL: &str = "prediktor_requests_total";
pub const REQUEST_LATENCY: &str = "prediktor_request_latency_ms";
pub const CANDIDATES_GENERATED: &str = "prediktor_candidates_generated_total";
pub const CANDIDATES_DROPPED: &str = "prediktor_candidates_dropped_total";
pub const POOL_WAIT: &str = "prediktor_pool_wait_ms";

/// Register metric descriptions with the installed recorder.
pub fn init_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Prediction requests by outcome");
    describe_histogram!(REQUEST_LATENCY, Unit::Milliseconds, "End-to-end request latency");
    describe_counter!(CANDIDATES_GENERATED, "Distinct fills produced by the generator");
    describe_counter!(CANDIDATES_DROPPED, "Fills removed for breaking every agreement constraint");
    describe_histogram!(POOL_WAIT, Unit::Milliseconds, "Time spent waiting for an execution permit");
}

pub fn record_request_success(latency: Duration, returned: usize) {
    counter!(REQUESTS_TOTAL, "outcome" => "ok").increment(1);
    histogram!(REQUEST_LATENCY, "outcome" => "ok").record(latency.as_secs_f64() * 1000.0);
    histogram!("prediktor_candidates_returned").record(returned as f64);
}

pub fn record_request_failure(latency: Duration, kind: &'static str, stage: &'static str) {
    counter!(REQUESTS_TOTAL, "outcome" => kind, "stage" => stage).increment(1);
    histogram!(REQUEST_LATENCY, "outcome" => "error").record(latency.as_secs_f64() * 1000.0);
}

pub fn record_candidates(generated: usize, dropped: usize) {
    counter!(CANDIDATES_GENERATED).increment(generated as u64);
    counter!(CANDIDATES_DROPPED).increment(dropped as u64);
}

pub fn record_pool_wait(wait: Duration) {
    histogram!(POOL_WAIT).record(wait.as_secs_f64() * 1000.0);
}
