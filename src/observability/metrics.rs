use metrics::{counter, histogram, describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

use crate::error::{LedgerError, Result};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for ledger operations. Calls are no-ops until a
/// recorder is installed with [`init_metrics`].
#[derive(Debug, Clone, Default)]
pub struct Metrics;

impl Metrics {
    pub fn new() -> Self {
        Self
    }

    pub fn record_operation_committed(&self, operation: &str) {
        counter!("ledger_operations_committed_total", "operation" => operation.to_string()).increment(1);
    }

    pub fn record_operation_aborted(&self, operation: &str, reason: &str) {
        counter!("ledger_operations_aborted_total", "operation" => operation.to_string(), "reason" => reason.to_string()).increment(1);
    }

    pub fn record_operation_latency(&self, operation: &str, duration_ms: f64) {
        histogram!("ledger_operation_duration_ms", "operation" => operation.to_string()).record(duration_ms);
    }

    pub fn record_amount_moved(&self, operation: &str, amount: f64) {
        histogram!("ledger_amount_moved", "operation" => operation.to_string()).record(amount);
    }

    pub fn record_history_query(&self, returned: usize) {
        histogram!("ledger_history_records_returned").record(returned as f64);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the Prometheus recorder and returns its handle. Subsequent calls
/// return the already-installed handle.
pub fn init_metrics() -> Result<PrometheusHandle> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| LedgerError::Internal(anyhow::anyhow!("Failed to install Prometheus recorder: {}", e)))?;
    describe_metrics();

    let handle = METRICS_HANDLE.get_or_init(|| handle).clone();
    METRICS.get_or_init(Metrics::new);

    Ok(handle)
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!("ledger_operations_committed_total", Unit::Count, "Ledger operations committed, by operation");
    describe_counter!("ledger_operations_aborted_total", Unit::Count, "Ledger operations aborted, by operation and reason");
    describe_histogram!("ledger_operation_duration_ms", Unit::Milliseconds, "Ledger operation latency in milliseconds");
    describe_histogram!("ledger_amount_moved", Unit::Count, "Amounts deposited or transferred");
    describe_histogram!("ledger_history_records_returned", Unit::Count, "Records returned per history query");

    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!("http_request_duration_ms", Unit::Milliseconds, "HTTP request latency in milliseconds");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
