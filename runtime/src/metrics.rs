//! Prometheus metrics for observability and monitoring.
//!
//! Metric families:
//! - Registration transactions (outcomes, conflicts, latency)
//! - Search index maintenance and the listing cache
//! - The background task queue
//! - Reconciliation sweeps
//!
//! Recording goes through the `metrics` facade, so recorder calls are no-ops
//! until a [`MetricsServer`] installs the Prometheus recorder.
//!
//! # Example
//!
//! ```rust,no_run
//! use conference_central_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Installs the global recorder and serves `/metrics` on `addr`.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and start the HTTP listener.
    ///
    /// Must be called inside a Tokio runtime. A recorder that is already
    /// installed is left in place and reported as success.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the exporter cannot be configured.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        let addr = self.addr;
        tokio::spawn(async move {
            if let Err(_err) = exporter.await {
                tracing::error!(%addr, "Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(addr = %self.addr, "Metrics server started");
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "registrations_total",
        "Register and cancel operations by operation and outcome"
    );
    describe_counter!(
        "transaction_conflicts_total",
        "Registration transactions aborted by write contention"
    );
    describe_histogram!(
        "transaction_duration_seconds",
        "Time spent in registration transactions, retries included"
    );

    describe_counter!(
        "index_updates_total",
        "Search index document upserts by outcome"
    );
    describe_counter!(
        "index_documents_removed_total",
        "Search index documents deleted because their record is gone"
    );
    describe_counter!(
        "listing_cache_requests_total",
        "Unfiltered listing reads by cache result"
    );

    describe_counter!(
        "task_queue_submitted_total",
        "Tasks accepted by a background queue"
    );
    describe_counter!(
        "task_queue_rejected_total",
        "Tasks rejected because a queue was full or closed"
    );
    describe_counter!(
        "task_queue_failed_total",
        "Tasks abandoned after their final attempt"
    );

    describe_counter!("reconcile_runs_total", "Completed reconciliation sweeps");
}

/// Registration metrics recorder.
pub struct RegistrationMetrics;

impl RegistrationMetrics {
    /// Record the outcome of a register or cancel call.
    pub fn record(operation: &'static str, outcome: &'static str, duration: Duration) {
        counter!("registrations_total", "operation" => operation, "outcome" => outcome)
            .increment(1);
        histogram!("transaction_duration_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
    }

    /// Record one aborted transaction attempt.
    pub fn record_conflict(operation: &'static str) {
        counter!("transaction_conflicts_total", "operation" => operation).increment(1);
    }
}

/// Search index and cache metrics recorder.
pub struct SyncMetrics;

impl SyncMetrics {
    /// Record a document upsert.
    pub fn record_index_update(success: bool) {
        let outcome = if success { "ok" } else { "error" };
        counter!("index_updates_total", "outcome" => outcome).increment(1);
    }

    /// Record orphaned documents removed.
    pub fn record_removed(count: u64) {
        counter!("index_documents_removed_total").increment(count);
    }

    /// Record a listing cache lookup (`hit`, `miss` or `error`).
    pub fn record_cache(result: &'static str) {
        counter!("listing_cache_requests_total", "result" => result).increment(1);
    }

    /// Record a completed reconciliation sweep.
    pub fn record_reconcile() {
        counter!("reconcile_runs_total").increment(1);
    }
}

/// Task queue metrics recorder.
pub struct TaskMetrics;

impl TaskMetrics {
    /// Record an accepted task.
    pub fn record_submitted(queue: &'static str) {
        counter!("task_queue_submitted_total", "queue" => queue).increment(1);
    }

    /// Record a rejected submission.
    pub fn record_rejected(queue: &'static str) {
        counter!("task_queue_rejected_total", "queue" => queue).increment(1);
    }

    /// Record an abandoned task.
    pub fn record_failed(queue: &'static str) {
        counter!("task_queue_failed_total", "queue" => queue).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[tokio::test]
    async fn test_start_twice_is_tolerated() {
        let mut first = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        let mut second = MetricsServer::new("127.0.0.1:0".parse().unwrap());

        first.start().unwrap();
        second.start().unwrap();

        RegistrationMetrics::record("register", "ok", Duration::from_millis(3));
        SyncMetrics::record_cache("hit");

        // Whichever server won the global recorder renders the metrics.
        if let Some(rendered) = first.render().or_else(|| second.render()) {
            assert!(rendered.contains("registrations_total"));
            assert!(rendered.contains("listing_cache_requests_total"));
        }
    }
}
