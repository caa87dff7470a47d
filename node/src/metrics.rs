//! # Prometheus Metrics
//!
//! Operational metrics for the node, scraped at `/metrics` on the metrics
//! port. Everything lives in a dedicated [`prometheus::Registry`] with the
//! `lendbook` prefix.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

use lendbook_contracts::LoanError;

/// Outcome label for accepted commands. Rejections use [`LoanError::kind`].
pub const OUTCOME_OK: &str = "ok";

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Loan commands by operation (`request`, `approve`, …) and outcome.
    pub loan_commands_total: IntCounterVec,
    /// Loans created.
    pub loans_requested_total: IntCounter,
    /// Current block height.
    pub block_height: IntGauge,
    /// Time spent executing a loan command, by operation.
    pub command_latency_seconds: HistogramVec,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("lendbook".into()), None)?;

        let loan_commands_total = IntCounterVec::new(
            Opts::new("loan_commands_total", "Loan commands by operation and outcome"),
            &["op", "outcome"],
        )?;
        registry.register(Box::new(loan_commands_total.clone()))?;

        let loans_requested_total =
            IntCounter::new("loans_requested_total", "Total number of loans created")?;
        registry.register(Box::new(loans_requested_total.clone()))?;

        let block_height = IntGauge::new("block_height", "Current block height")?;
        registry.register(Box::new(block_height.clone()))?;

        let command_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "command_latency_seconds",
                "Loan command execution latency in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
            &["op"],
        )?;
        registry.register(Box::new(command_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            loan_commands_total,
            loans_requested_total,
            block_height,
            command_latency_seconds,
        })
    }

    /// Records one command's outcome and latency.
    pub fn observe_command<T>(&self, op: &str, result: &Result<T, LoanError>, elapsed: Duration) {
        let outcome = match result {
            Ok(_) => OUTCOME_OK,
            Err(e) => e.kind(),
        };
        self.loan_commands_total
            .with_label_values(&[op, outcome])
            .inc();
        self.command_latency_seconds
            .with_label_values(&[op])
            .observe(elapsed.as_secs_f64());
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
