//! The root configuration type.

use crate::{
    ConfigError, ErrorLogConfig, MetricsLogConfig, RequestLogConfig, ResponseLogConfig,
    TelemetrySection,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use waypoint_core::DiagnosticKeys;
use waypoint_telemetry::logging::create_env_filter;
use waypoint_telemetry::{LogConfig, LogFormat, MetricsConfig, PayloadSanitizer, TelemetryConfig};

/// Complete configuration of the observability pipeline.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use waypoint_config::ObservabilityConfig;
///
/// let config = ObservabilityConfig::default();
/// assert_eq!(config.max_payload_length, 10_000);
/// assert_eq!(config.metrics.slow_request_threshold_ms, 1000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Master switch. When off, requests pass straight through.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Fraction of requests logged with full detail.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    /// Log request bodies of sampled requests.
    #[serde(default = "default_true")]
    pub include_payload: bool,

    /// Longest logged body, in characters.
    #[serde(default = "default_max_payload_length")]
    pub max_payload_length: usize,

    /// Replace sensitive values with `***`.
    #[serde(default = "default_true")]
    pub mask_sensitive_data: bool,

    /// Field and header names whose values are masked (case-insensitive).
    #[serde(default = "default_sensitive_fields")]
    pub sensitive_fields: Vec<String>,

    /// Request logging.
    #[serde(default)]
    pub request: RequestLogConfig,

    /// Response logging.
    #[serde(default)]
    pub response: ResponseLogConfig,

    /// Failure handling.
    #[serde(default)]
    pub error: ErrorLogConfig,

    /// Request metrics.
    #[serde(default)]
    pub metrics: MetricsLogConfig,

    /// Key names of the diagnostic map.
    #[serde(default)]
    pub diagnostic_keys: DiagnosticKeys,

    /// Logging and exporter backends.
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

fn default_true() -> bool {
    true
}

fn default_sample_rate() -> f64 {
    1.0
}

fn default_max_payload_length() -> usize {
    10_000
}

fn default_sensitive_fields() -> Vec<String> {
    ["password", "ssn", "creditCard", "secret", "token", "authorization"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: default_sample_rate(),
            include_payload: true,
            max_payload_length: default_max_payload_length(),
            mask_sensitive_data: true,
            sensitive_fields: default_sensitive_fields(),
            request: RequestLogConfig::default(),
            response: ResponseLogConfig::default(),
            error: ErrorLogConfig::default(),
            metrics: MetricsLogConfig::default(),
            diagnostic_keys: DiagnosticKeys::default(),
            telemetry: TelemetrySection::default(),
        }
    }
}

impl ObservabilityConfig {
    /// Preset for local development: pretty debug logs, no exporter.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.metrics_exporter.enabled = false;
        config
    }

    /// Preset for production: JSON logs, no payloads, exporter on port 9090.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.include_payload = false;
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.metrics_exporter.addr = Some("0.0.0.0:9090".to_string());
        config
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - `sample_rate` is not in 0.0..=1.0
    /// - `error.fallback_status` is not a 4xx or 5xx code
    /// - `error.max_message_length` is shorter than the ellipsis
    /// - `max_payload_length` is zero
    /// - a diagnostic key is empty or used twice
    /// - the exporter address or the log level does not parse
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.sample_rate) {
            return Err(ConfigError::invalid_value(
                "sample_rate",
                "must be between 0.0 and 1.0",
            ));
        }

        if !(400..=599).contains(&self.error.fallback_status) {
            return Err(ConfigError::invalid_value(
                "error.fallback_status",
                format!("{} is not a 4xx or 5xx status", self.error.fallback_status),
            ));
        }

        if self.error.max_message_length < 3 {
            return Err(ConfigError::invalid_value(
                "error.max_message_length",
                "must be at least 3",
            ));
        }

        if self.max_payload_length == 0 {
            return Err(ConfigError::invalid_value(
                "max_payload_length",
                "must be greater than zero",
            ));
        }

        let mut seen = HashSet::new();
        for key in self.diagnostic_keys.all() {
            if key.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    "diagnostic_keys",
                    "keys must not be empty",
                ));
            }
            if !seen.insert(key) {
                return Err(ConfigError::invalid_value(
                    "diagnostic_keys",
                    format!("key '{key}' is used more than once"),
                ));
            }
        }

        let exporter = &self.telemetry.metrics_exporter;
        if let Some(addr) = exporter.addr.as_deref().filter(|_| exporter.enabled) {
            if addr.parse::<std::net::SocketAddr>().is_err() {
                return Err(ConfigError::invalid_value(
                    "telemetry.metrics_exporter.addr",
                    format!("invalid socket address: {addr}"),
                ));
            }
        }

        if create_env_filter(&self.telemetry.logging.level).is_err() {
            return Err(ConfigError::invalid_value(
                "telemetry.logging.level",
                format!("invalid filter directive: {}", self.telemetry.logging.level),
            ));
        }

        Ok(())
    }

    /// Builds the telemetry configuration for `init_telemetry`.
    #[must_use]
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let section = &self.telemetry;
        let base = if section.logging.format == LogFormat::Pretty {
            LogConfig::development()
        } else {
            LogConfig::production()
        };
        let logging = LogConfig {
            enabled: section.logging.enabled,
            level: section.logging.level.clone(),
            format: section.logging.format,
            ..base
        };
        let metrics = MetricsConfig {
            enabled: section.metrics_exporter.enabled,
            listen_addr: section.metrics_exporter.addr.clone(),
            ..MetricsConfig::default()
        };

        TelemetryConfig::for_service(&section.service_name)
            .with_logging(logging)
            .with_metrics(metrics)
    }

    /// Builds the payload sanitizer.
    #[must_use]
    pub fn sanitizer(&self) -> PayloadSanitizer {
        PayloadSanitizer::new(
            &self.sensitive_fields,
            self.max_payload_length,
            self.mask_sensitive_data,
        )
    }

    /// Returns the slow-request threshold.
    #[must_use]
    pub fn slow_request_threshold(&self) -> Duration {
        Duration::from_millis(self.metrics.slow_request_threshold_ms)
    }
}
