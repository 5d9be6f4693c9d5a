//! Prometheus metrics for the triage pipeline
//!
//! All metrics live in the default registry and are rendered by the HTTP API
//! under `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Triage Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Completed triage cycles, by outcome.
    ///
    /// Labels:
    /// - outcome: skipped, escalated, restarted, restart_failed, failed
    pub static ref TRIAGE_CYCLES: CounterVec = register_counter_vec!(
        "sentinel_triage_cycles_total",
        "Triage cycles by outcome",
        &["outcome"]
    ).expect("failed to register TRIAGE_CYCLES metric");

    /// Policy decisions, by action (no_op, restart, escalate).
    pub static ref DECISIONS: CounterVec = register_counter_vec!(
        "sentinel_decisions_total",
        "Policy decisions by action",
        &["action"]
    ).expect("failed to register DECISIONS metric");

    /// Restart attempts, by result (ok, refused, error).
    pub static ref RESTARTS: CounterVec = register_counter_vec!(
        "sentinel_restarts_total",
        "Restart attempts by result",
        &["result"]
    ).expect("failed to register RESTARTS metric");

    /// Records held in the current session.
    pub static ref SESSION_RECORDS: Gauge = register_gauge!(
        "sentinel_session_records",
        "Incident records in the current session"
    ).expect("failed to register SESSION_RECORDS metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Classifier Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Time spent in `diagnose`, by classifier name.
    pub static ref CLASSIFIER_DURATION: HistogramVec = register_histogram_vec!(
        "sentinel_classifier_duration_seconds",
        "Classifier latency in seconds",
        &["classifier"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).expect("failed to register CLASSIFIER_DURATION metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Gateway Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Gateway calls, by operation and status.
    ///
    /// Labels:
    /// - op: e.g. "docker_logs", "rpc_restart", "fetch_logs"
    /// - status: "ok" or the error kind
    pub static ref GATEWAY_CALLS: CounterVec = register_counter_vec!(
        "sentinel_gateway_calls_total",
        "Gateway calls by operation and status",
        &["op", "status"]
    ).expect("failed to register GATEWAY_CALLS metric");

    pub static ref GATEWAY_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "sentinel_gateway_call_duration_seconds",
        "Gateway call latency in seconds",
        &["op"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    ).expect("failed to register GATEWAY_CALL_DURATION metric");

    /// Ops server request latency, by RPC method.
    pub static ref GRPC_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "sentinel_grpc_request_duration_seconds",
        "OpsService request latency in seconds",
        &["method"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    ).expect("failed to register GRPC_REQUEST_DURATION metric");
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_registered_metrics() {
        DECISIONS.with_label_values(&["no_op"]).inc();
        let text = render().unwrap();
        assert!(text.contains("sentinel_decisions_total"));
    }
}
