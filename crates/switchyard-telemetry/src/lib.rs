//! Observability for Switchyard.
//!
//! This crate provides the logging, metrics and lifecycle observers used by
//! Switchyard services:
//!
//! - **Logging**: Structured JSON or pretty logging via `tracing-subscriber`
//! - **Metrics**: Prometheus-format metrics via the `metrics` crate
//! - **Observers**: [`TracingObserver`] and [`MetricsObserver`] turn every
//!   lifecycle notification into a log line and a counter increment
//!
//! # Architecture
//!
//! ```text
//!   PrefixRouter::notify(stage, ctx)
//!            │
//!            ▼
//!     ObserverRegistry
//!        │         │
//!        ▼         ▼
//!  TracingObserver  MetricsObserver
//!        │               │
//!        ▼               ▼
//!   stdout/stderr    Prometheus /metrics
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use switchyard_telemetry::{TelemetryConfig, init_telemetry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::builder()
//!         .service_name("my-router")
//!         .metrics_addr("0.0.0.0:9090")
//!         .build();
//!
//!     init_telemetry(&config).expect("Failed to init telemetry");
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod observer;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use metrics::{init_metrics, InFlightGuard, MetricsConfig};
pub use observer::{MetricsObserver, TracingObserver};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging, then metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if any subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_telemetry_disabled() {
        let config = TelemetryConfig {
            logging: LogConfig {
                enabled: false,
                ..LogConfig::default()
            },
            metrics: MetricsConfig {
                enabled: false,
                ..MetricsConfig::default()
            },
            ..TelemetryConfig::default()
        };
        assert!(init_telemetry(&config).is_ok());
    }
}
