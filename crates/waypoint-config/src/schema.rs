//! Configuration sections.
//!
//! Every field has a default, so a file only needs the values it changes.

use serde::{Deserialize, Serialize};
use waypoint_telemetry::LogFormat;

fn default_true() -> bool {
    true
}

/// What the "request started" line carries for sampled requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RequestLogConfig {
    /// Log request detail at all. Identifiers, method and path are always logged.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log (masked) request headers.
    #[serde(default = "default_true")]
    pub include_headers: bool,

    /// Log (masked) query parameters.
    #[serde(default = "default_true")]
    pub include_query_params: bool,

    /// Log client address and user agent.
    #[serde(default = "default_true")]
    pub include_client_info: bool,
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_headers: true,
            include_query_params: true,
            include_client_info: true,
        }
    }
}

/// What the "request completed" line and the response carry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ResponseLogConfig {
    /// Log response detail at all. Status and duration are always logged.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log response headers for sampled requests.
    #[serde(default = "default_true")]
    pub include_headers: bool,

    /// Add an `X-Response-Time` header to responses.
    #[serde(default = "default_true")]
    pub include_time_taken: bool,
}

impl Default for ResponseLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_headers: true,
            include_time_taken: true,
        }
    }
}

/// Failure classification and error logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ErrorLogConfig {
    /// Log the failure's full source chain.
    #[serde(default = "default_true")]
    pub include_stack_trace: bool,

    /// Log client information with the failure.
    #[serde(default = "default_true")]
    pub include_request_details: bool,

    /// Status for recognized application failures without a more specific mapping.
    #[serde(default = "default_fallback_status")]
    pub fallback_status: u16,

    /// Longest client-facing message, in characters.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
}

impl Default for ErrorLogConfig {
    fn default() -> Self {
        Self {
            include_stack_trace: true,
            include_request_details: true,
            fallback_status: default_fallback_status(),
            max_message_length: default_max_message_length(),
        }
    }
}

fn default_fallback_status() -> u16 {
    500
}

fn default_max_message_length() -> usize {
    200
}

/// Request metrics and slow-request detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsLogConfig {
    /// Record request metrics.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Emit a warning for requests over the threshold.
    #[serde(default = "default_true")]
    pub log_slow_requests: bool,

    /// Slow-request threshold in milliseconds.
    #[serde(default = "default_slow_threshold")]
    pub slow_request_threshold_ms: u64,
}

impl Default for MetricsLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_slow_requests: true,
            slow_request_threshold_ms: default_slow_threshold(),
        }
    }
}

fn default_slow_threshold() -> u64 {
    1000
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Install the global log subscriber.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (e.g., "info" or "info,waypoint=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::Json,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExporterSection {
    /// Install the Prometheus recorder.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to serve `/metrics` on. Unset means render-only.
    #[serde(default)]
    pub addr: Option<String>,
}

impl Default for ExporterSection {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: None,
        }
    }
}

/// Service identity and telemetry backends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Service name written on log lines and metric labels.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub metrics_exporter: ExporterSection,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            logging: LoggingSection::default(),
            metrics_exporter: ExporterSection::default(),
        }
    }
}

fn default_service_name() -> String {
    "waypoint".to_string()
}
