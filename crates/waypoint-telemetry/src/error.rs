//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while setting up telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize metrics.
    #[error("Failed to initialize metrics: {0}")]
    MetricsInit(String),

    /// Failed to initialize logging.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to parse address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a [`MetricsSink`](crate::metrics::MetricsSink).
///
/// The recorder never lets these reach the request path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetricsError {
    /// The backend refused or could not accept the observation.
    #[error("metrics backend unavailable: {0}")]
    Unavailable(String),

    /// The observation itself was malformed.
    #[error("invalid metric {name}: {reason}")]
    InvalidMetric {
        /// Metric name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
}
