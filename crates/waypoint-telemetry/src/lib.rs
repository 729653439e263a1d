//! # Waypoint Telemetry
//!
//! Logging, metric and trace plumbing for the Waypoint pipeline:
//!
//! - **Logging**: JSON lines merged with the ambient diagnostic map
//!   ([`logging::DiagnosticJsonFormat`])
//! - **Metrics**: a pluggable [`MetricsSink`], a tag-normalizing
//!   [`MetricsRecorder`] and a Prometheus exporter
//! - **Tracing**: lookup of the active OpenTelemetry span and W3C
//!   `traceparent` parsing ([`TraceProvider`])
//! - **Sanitizing**: masking and truncation of logged payloads
//! - **Capture**: an in-memory layer for asserting on log output
//!
//! # Example
//!
//! ```rust,ignore
//! use waypoint_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TelemetryConfig::for_service("ledger").serve_metrics_on("0.0.0.0:9464");
//!
//!     let telemetry = init_telemetry(&config)?;
//!     // ...
//!     if let Some(registry) = telemetry.metrics() {
//!         println!("{}", registry.render());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Metrics Endpoint
//!
//! ```text
//! # TYPE http_server_requests_total counter
//! http_server_requests_total{service="ledger",path="/accounts/{id}",method="POST",status="400",outcome="CLIENT_ERROR"} 1
//! ```

#![doc(html_root_url = "https://docs.rs/waypoint-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod capture;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod recorder;
pub mod sanitize;
pub mod tracing;

pub use capture::{CapturedEvent, LogCapture};
pub use config::TelemetryConfig;
pub use error::{MetricsError, TelemetryError};
pub use logging::{init_logging, DiagnosticJsonFormat, LogConfig, LogFormat, LIFECYCLE_TARGET};
pub use self::metrics::{
    init_metrics, render_metrics, GlobalMetricsSink, InMemoryMetricsSink, MetricsConfig,
    MetricsRegistry, MetricsSink, Tag,
};
pub use recorder::{normalize_path, MetricTagSet, MetricsRecorder, OperationOutcome, PoolStats};
pub use sanitize::PayloadSanitizer;
pub use self::tracing::{NoopTraceProvider, OtelTraceProvider, SpanIds, TraceContext, TraceProvider};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Handle returned by [`init_telemetry`].
#[derive(Debug, Clone)]
pub struct Telemetry {
    metrics: Option<MetricsRegistry>,
}

impl Telemetry {
    /// Returns the Prometheus registry, if metrics were enabled.
    #[must_use]
    pub fn metrics(&self) -> Option<&MetricsRegistry> {
        self.metrics.as_ref()
    }
}

/// Initializes logging and metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<Telemetry> {
    init_logging(&config.logging)?;
    let metrics = init_metrics(&config.metrics)?;

    ::tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        metrics = metrics.is_some(),
        "telemetry initialized"
    );

    Ok(Telemetry { metrics })
}
