//! Prometheus metrics for Switchyard.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `switchyard_requests_total` | Counter | `status` | Total requests |
//! | `switchyard_request_duration_seconds` | Histogram | - | Request latency |
//! | `switchyard_in_flight_requests` | Gauge | - | In-flight requests |
//! | `switchyard_request_size_bytes` | Histogram | - | Request body size |
//! | `switchyard_response_size_bytes` | Histogram | - | Response body size |
//! | `switchyard_lifecycle_events_total` | Counter | `stage` | Lifecycle notifications |
//!
//! # Example
//!
//! ```rust,ignore
//! use switchyard_telemetry::metrics::record_request;
//!
//! record_request(200, Duration::from_millis(45));
//! ```

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use switchyard_core::Stage;

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Request counter.
pub const REQUESTS_TOTAL: &str = "switchyard_requests_total";
/// Request duration histogram.
pub const REQUEST_DURATION_SECONDS: &str = "switchyard_request_duration_seconds";
/// In-flight request gauge.
pub const IN_FLIGHT_REQUESTS: &str = "switchyard_in_flight_requests";
/// Request body size histogram.
pub const REQUEST_SIZE_BYTES: &str = "switchyard_request_size_bytes";
/// Response body size histogram.
pub const RESPONSE_SIZE_BYTES: &str = "switchyard_response_size_bytes";
/// Lifecycle notification counter.
pub const LIFECYCLE_EVENTS_TOTAL: &str = "switchyard_lifecycle_events_total";

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Address to expose metrics on (e.g., "0.0.0.0:9090").
    pub addr: String,

    /// Service name, added as a global `service` label.
    pub service_name: String,

    /// Histogram buckets for request duration.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: "0.0.0.0:9090".to_string(),
            service_name: "switchyard".to_string(),
            // 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Initializes the metrics subsystem and starts the Prometheus listener.
///
/// Must be called from within a Tokio runtime; the listener runs as a task.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for an unparsable address and
/// `TelemetryError::MetricsInit` if the recorder cannot be installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    let mut builder = PrometheusBuilder::new()
        .add_global_label("service", config.service_name.clone());

    if !config.duration_buckets.is_empty() {
        builder = builder
            .set_buckets_for_metric(
                Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
                &config.duration_buckets,
            )
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| TelemetryError::MetricsInit(format!("no async runtime: {e}")))?;

    let (recorder, exporter) = builder
        .with_http_listener(addr)
        .build()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    runtime.spawn(async move {
        if let Err(e) = exporter.await {
            tracing::error!(error = ?e, "Metrics exporter stopped");
        }
    });

    let _ = METRICS_HANDLE.set(handle);

    register_metric_descriptions();
    tracing::info!("Metrics listening on {}", addr);

    Ok(())
}

/// Renders metrics in Prometheus format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(REQUESTS_TOTAL, "Total number of HTTP requests processed");
    describe_histogram!(REQUEST_DURATION_SECONDS, "HTTP request duration in seconds");
    describe_gauge!(
        IN_FLIGHT_REQUESTS,
        "Number of HTTP requests currently being processed"
    );
    describe_histogram!(REQUEST_SIZE_BYTES, "HTTP request body size in bytes");
    describe_histogram!(RESPONSE_SIZE_BYTES, "HTTP response body size in bytes");
    describe_counter!(
        LIFECYCLE_EVENTS_TOTAL,
        "Lifecycle notifications delivered, by stage"
    );
}

/// Records a finished request.
pub fn record_request(status_code: u16, duration: Duration) {
    counter!(REQUESTS_TOTAL, "status" => status_code.to_string()).increment(1);
    histogram!(REQUEST_DURATION_SECONDS).record(duration.as_secs_f64());
}

/// Records request body size.
#[allow(clippy::cast_precision_loss)]
pub fn record_request_size(size_bytes: u64) {
    histogram!(REQUEST_SIZE_BYTES).record(size_bytes as f64);
}

/// Records response body size.
#[allow(clippy::cast_precision_loss)]
pub fn record_response_size(size_bytes: u64) {
    histogram!(RESPONSE_SIZE_BYTES).record(size_bytes as f64);
}

/// Records one lifecycle notification.
pub fn record_lifecycle_event(stage: Stage) {
    counter!(LIFECYCLE_EVENTS_TOTAL, "stage" => stage.name()).increment(1);
}

/// Guard that decrements in-flight requests on drop.
///
/// Use this to ensure in-flight counter is always decremented, even on panic.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Creates a new guard and increments the in-flight counter.
    #[must_use]
    pub fn new() -> Self {
        gauge!(IN_FLIGHT_REQUESTS).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(IN_FLIGHT_REQUESTS).decrement(1.0);
    }
}
