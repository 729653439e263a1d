//! Telemetry configuration.

use crate::logging::LogConfig;
use crate::metrics::MetricsConfig;

/// Settings for [`init_telemetry`](crate::init_telemetry).
///
/// The service name is stamped onto log lines and metric labels, so it is
/// kept in sync with the logging and metrics sections by every setter.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name.
    pub service_name: String,

    /// Service version, logged once at startup.
    pub service_version: String,

    /// Prometheus exporter settings.
    pub metrics: MetricsConfig,

    /// Subscriber settings.
    pub logging: LogConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::for_service("waypoint")
    }
}

impl TelemetryConfig {
    /// Default settings for `service_name`.
    #[must_use]
    pub fn for_service(service_name: &str) -> Self {
        Self {
            service_name: String::new(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics: MetricsConfig::default(),
            logging: LogConfig::default(),
        }
        .renamed(service_name)
    }

    /// Replaces the logging section.
    #[must_use]
    pub fn with_logging(self, logging: LogConfig) -> Self {
        let name = self.service_name.clone();
        Self { logging, ..self }.renamed(&name)
    }

    /// Replaces the metrics section.
    #[must_use]
    pub fn with_metrics(self, metrics: MetricsConfig) -> Self {
        let name = self.service_name.clone();
        Self { metrics, ..self }.renamed(&name)
    }

    /// Enables the exporter and serves `/metrics` on `addr`.
    #[must_use]
    pub fn serve_metrics_on(mut self, addr: &str) -> Self {
        self.metrics.enabled = true;
        self.metrics.listen_addr = Some(addr.to_string());
        self
    }

    fn renamed(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self.metrics.service_name = service_name.to_string();
        self.logging.service_name = service_name.to_string();
        self
    }
}
