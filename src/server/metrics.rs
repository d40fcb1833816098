//! Prometheus metrics collection and export.
//!
//! The recorder is installed once by the binary. Without a recorder the
//! `metrics` macros are no-ops, so library code records unconditionally.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use tracing::info;

pub const REQUESTS_TOTAL: &str = "stt_requests_total";
pub const REQUESTS_FAILED_TOTAL: &str = "stt_requests_failed_total";
pub const TRANSCRIPTION_DURATION: &str = "stt_transcription_duration_seconds";
pub const MODEL_LOAD_DURATION: &str = "stt_model_load_duration_seconds";
pub const MODEL_LOADS_TOTAL: &str = "stt_model_loads_total";
pub const MODEL_LOADED: &str = "stt_model_loaded";

/// Install the global Prometheus recorder and describe every metric.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    info!("Metrics collection initialized");
    Ok(handle)
}

pub fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total number of HTTP requests by endpoint");
    describe_counter!(
        REQUESTS_FAILED_TOTAL,
        "Total number of failed requests by endpoint and error kind"
    );
    describe_histogram!(
        TRANSCRIPTION_DURATION,
        "Duration of successful transcriptions in seconds"
    );
    describe_histogram!(MODEL_LOAD_DURATION, "Duration of model load attempts in seconds");
    describe_counter!(MODEL_LOADS_TOTAL, "Model load attempts by outcome");
    describe_gauge!(MODEL_LOADED, "Whether the model is loaded (0 or 1)");
}

pub fn record_request(endpoint: &'static str) {
    counter!(REQUESTS_TOTAL, "endpoint" => endpoint).increment(1);
}

pub fn record_failure(endpoint: &'static str, error_kind: &'static str) {
    counter!(REQUESTS_FAILED_TOTAL, "endpoint" => endpoint, "error" => error_kind).increment(1);
}

pub fn record_transcription_duration(elapsed: Duration) {
    histogram!(TRANSCRIPTION_DURATION).record(elapsed.as_secs_f64());
}

pub fn record_model_load(elapsed: Duration, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(MODEL_LOADS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(MODEL_LOAD_DURATION, "outcome" => outcome).record(elapsed.as_secs_f64());
}

pub fn set_model_loaded(loaded: bool) {
    gauge!(MODEL_LOADED).set(if loaded { 1.0 } else { 0.0 });
}
