//! Metric sinks and the Prometheus exporter.
//!
//! Everything Waypoint measures goes through a [`MetricsSink`]. The default
//! [`GlobalMetricsSink`] forwards to the `metrics` facade, which the
//! Prometheus exporter installed by [`init_metrics`] renders in text format.
//! Tests use [`InMemoryMetricsSink`] and query what was emitted.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Tags |
//! |--------|------|------|
//! | `http_server_requests_total` | Counter | `path`, `method`, `status`, `outcome`, `tenant`? |
//! | `http_server_request_duration_seconds` | Histogram | same as above |
//! | `http_server_errors_total` | Counter | above plus `exception` |
//! | `cache_access_total` | Counter | `cache`, `result` |
//! | `db_connections_{active,idle,total,waiting}` | Gauge | `pool` |
//! | `operation_duration_seconds` | Histogram | `operation`, `outcome` |
//! | `operation_errors_total` | Counter | `operation`, `exception` |
//! | `db_query_duration_seconds` | Histogram | `operation`, `table`? |
//! | `resource_usage` | Gauge | `resource`, `tenant`? |

use crate::error::{MetricsError, TelemetryError};
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Label};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Standard metric names.
pub mod names {
    /// Requests handled, by normalized path and status.
    pub const HTTP_REQUESTS_TOTAL: &str = "http_server_requests_total";
    /// Request latency.
    pub const HTTP_REQUEST_DURATION: &str = "http_server_request_duration_seconds";
    /// Failed requests, by failure kind.
    pub const HTTP_ERRORS_TOTAL: &str = "http_server_errors_total";
    /// Cache lookups, by hit or miss.
    pub const CACHE_ACCESS_TOTAL: &str = "cache_access_total";
    /// Connections currently in use.
    pub const DB_CONNECTIONS_ACTIVE: &str = "db_connections_active";
    /// Connections idle in the pool.
    pub const DB_CONNECTIONS_IDLE: &str = "db_connections_idle";
    /// Connections owned by the pool.
    pub const DB_CONNECTIONS_TOTAL: &str = "db_connections_total";
    /// Callers waiting for a connection.
    pub const DB_CONNECTIONS_WAITING: &str = "db_connections_waiting";
    /// Duration of a named business operation.
    pub const OPERATION_DURATION: &str = "operation_duration_seconds";
    /// Failures of a named business operation.
    pub const OPERATION_ERRORS_TOTAL: &str = "operation_errors_total";
    /// Database query latency.
    pub const DB_QUERY_DURATION: &str = "db_query_duration_seconds";
    /// Arbitrary resource usage level.
    pub const RESOURCE_USAGE: &str = "resource_usage";
}

/// One metric tag: a fixed key and its value.
pub type Tag = (&'static str, String);

/// Destination for metric observations.
pub trait MetricsSink: Send + Sync + 'static {
    /// Adds one to the counter `name` with `tags`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the observation.
    fn increment_counter(&self, name: &str, tags: &[Tag]) -> Result<(), MetricsError>;

    /// Records one timing observation.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the observation.
    fn record_timer(&self, name: &str, tags: &[Tag], duration: Duration) -> Result<(), MetricsError>;

    /// Sets a gauge to `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the observation.
    fn set_gauge(&self, name: &str, tags: &[Tag], value: f64) -> Result<(), MetricsError>;
}

fn check_name(name: &str) -> Result<(), MetricsError> {
    if name.is_empty() {
        return Err(MetricsError::InvalidMetric {
            name: name.to_string(),
            reason: "metric name is empty".to_string(),
        });
    }
    Ok(())
}

/// [`MetricsSink`] that forwards to the `metrics` facade.
///
/// Without an installed recorder the observations are discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalMetricsSink;

impl GlobalMetricsSink {
    fn labels(tags: &[Tag]) -> Vec<Label> {
        tags.iter()
            .map(|(key, value)| Label::new(*key, value.clone()))
            .collect()
    }
}

impl MetricsSink for GlobalMetricsSink {
    fn increment_counter(&self, name: &str, tags: &[Tag]) -> Result<(), MetricsError> {
        check_name(name)?;
        counter!(name.to_string(), Self::labels(tags)).increment(1);
        Ok(())
    }

    fn record_timer(&self, name: &str, tags: &[Tag], duration: Duration) -> Result<(), MetricsError> {
        check_name(name)?;
        histogram!(name.to_string(), Self::labels(tags)).record(duration.as_secs_f64());
        Ok(())
    }

    fn set_gauge(&self, name: &str, tags: &[Tag], value: f64) -> Result<(), MetricsError> {
        check_name(name)?;
        gauge!(name.to_string(), Self::labels(tags)).set(value);
        Ok(())
    }
}

/// An observation captured by [`InMemoryMetricsSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// A counter increment.
    Counter {
        /// Metric name.
        name: String,
        /// Tags in emission order.
        tags: Vec<(String, String)>,
    },
    /// A timer observation.
    Timer {
        /// Metric name.
        name: String,
        /// Tags in emission order.
        tags: Vec<(String, String)>,
        /// Observed duration.
        duration: Duration,
    },
    /// A gauge update.
    Gauge {
        /// Metric name.
        name: String,
        /// Tags in emission order.
        tags: Vec<(String, String)>,
        /// New value.
        value: f64,
    },
}

impl Observation {
    /// Returns the metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Counter { name, .. } | Self::Timer { name, .. } | Self::Gauge { name, .. } => name,
        }
    }

    /// Returns the tags.
    #[must_use]
    pub fn tags(&self) -> &[(String, String)] {
        match self {
            Self::Counter { tags, .. } | Self::Timer { tags, .. } | Self::Gauge { tags, .. } => tags,
        }
    }

    /// Returns the value of tag `key`.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn matches(&self, name: &str, filter: &[(&str, &str)]) -> bool {
        self.name() == name && filter.iter().all(|(k, v)| self.tag(k) == Some(*v))
    }
}

/// [`MetricsSink`] that keeps every observation in memory.
///
/// Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetricsSink {
    observations: Arc<Mutex<Vec<Observation>>>,
    unavailable: bool,
}

impl InMemoryMetricsSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that rejects every observation.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Returns a snapshot of all observations.
    #[must_use]
    pub fn observations(&self) -> Vec<Observation> {
        self.observations.lock().clone()
    }

    /// Returns observations named `name` whose tags include every pair in `filter`.
    #[must_use]
    pub fn find(&self, name: &str, filter: &[(&str, &str)]) -> Vec<Observation> {
        self.observations
            .lock()
            .iter()
            .filter(|o| o.matches(name, filter))
            .cloned()
            .collect()
    }

    /// Sums counter increments matching `name` and `filter`.
    #[must_use]
    pub fn counter_total(&self, name: &str, filter: &[(&str, &str)]) -> u64 {
        self.find(name, filter)
            .iter()
            .filter(|o| matches!(o, Observation::Counter { .. }))
            .count() as u64
    }

    /// Returns the durations of matching timer observations.
    #[must_use]
    pub fn timers(&self, name: &str, filter: &[(&str, &str)]) -> Vec<Duration> {
        self.find(name, filter)
            .into_iter()
            .filter_map(|o| match o {
                Observation::Timer { duration, .. } => Some(duration),
                _ => None,
            })
            .collect()
    }

    /// Returns the latest value of a matching gauge.
    #[must_use]
    pub fn gauge(&self, name: &str, filter: &[(&str, &str)]) -> Option<f64> {
        self.find(name, filter).into_iter().rev().find_map(|o| match o {
            Observation::Gauge { value, .. } => Some(value),
            _ => None,
        })
    }

    /// Removes every observation.
    pub fn clear(&self) {
        self.observations.lock().clear();
    }

    fn push(&self, name: &str, observation: Observation) -> Result<(), MetricsError> {
        check_name(name)?;
        if self.unavailable {
            return Err(MetricsError::Unavailable("in-memory sink disabled".to_string()));
        }
        self.observations.lock().push(observation);
        Ok(())
    }
}

fn owned(tags: &[Tag]) -> Vec<(String, String)> {
    tags.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
}

impl MetricsSink for InMemoryMetricsSink {
    fn increment_counter(&self, name: &str, tags: &[Tag]) -> Result<(), MetricsError> {
        self.push(
            name,
            Observation::Counter {
                name: name.to_string(),
                tags: owned(tags),
            },
        )
    }

    fn record_timer(&self, name: &str, tags: &[Tag], duration: Duration) -> Result<(), MetricsError> {
        self.push(
            name,
            Observation::Timer {
                name: name.to_string(),
                tags: owned(tags),
                duration,
            },
        )
    }

    fn set_gauge(&self, name: &str, tags: &[Tag], value: f64) -> Result<(), MetricsError> {
        self.push(
            name,
            Observation::Gauge {
                name: name.to_string(),
                tags: owned(tags),
                value,
            },
        )
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether the Prometheus recorder is installed.
    pub enabled: bool,

    /// Address to serve `/metrics` on (e.g., "0.0.0.0:9090").
    ///
    /// When unset the recorder is installed without a listener and
    /// [`render_metrics`] is the only way to read it.
    pub listen_addr: Option<String>,

    /// Service name, added as a global `service` label.
    pub service_name: String,

    /// Histogram buckets for `*_duration_seconds` metrics.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: None,
            service_name: "waypoint".to_string(),
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Handle to the installed Prometheus recorder.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    handle: PrometheusHandle,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with the given handle.
    #[must_use]
    pub fn new(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    /// Renders all metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Installs the Prometheus recorder.
///
/// Returns `None` when metrics are disabled. Calling this again after a
/// successful install returns the existing registry.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for an unparsable listen address,
/// `TelemetryError::InvalidConfig` when a listener is requested outside a
/// tokio runtime, and `TelemetryError::MetricsInit` if installation fails.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<Option<MetricsRegistry>> {
    if !config.enabled {
        return Ok(None);
    }
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(Some(MetricsRegistry::new(handle.clone())));
    }

    let addr: Option<SocketAddr> = config
        .listen_addr
        .as_deref()
        .map(|addr| {
            addr.parse()
                .map_err(|e| TelemetryError::InvalidAddress(format!("{addr}: {e}")))
        })
        .transpose()?;

    let builder = PrometheusBuilder::new()
        .add_global_label("service", config.service_name.clone())
        .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), &config.duration_buckets)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let handle = match addr {
        Some(addr) => {
            let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
                TelemetryError::InvalidConfig(
                    "a metrics listener requires a running tokio runtime".to_string(),
                )
            })?;
            let _entered = runtime.enter();
            let (recorder, exporter) = builder
                .with_http_listener(addr)
                .build()
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder)
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
            runtime.spawn(async move {
                if let Err(e) = exporter.await {
                    tracing::error!(error = ?e, "metrics listener stopped");
                }
            });
            handle
        }
        None => builder
            .install_recorder()
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?,
    };

    let handle = METRICS_HANDLE.get_or_init(|| handle).clone();
    register_metric_descriptions();

    Ok(Some(MetricsRegistry::new(handle)))
}

/// Returns the global metrics handle if initialized.
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Renders metrics in Prometheus format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(names::HTTP_REQUESTS_TOTAL, "Total number of HTTP requests handled");
    describe_histogram!(
        names::HTTP_REQUEST_DURATION,
        metrics::Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_counter!(names::HTTP_ERRORS_TOTAL, "HTTP requests that ended in a failure");
    describe_counter!(names::CACHE_ACCESS_TOTAL, "Cache lookups by result");
    describe_gauge!(names::DB_CONNECTIONS_ACTIVE, "Pool connections in use");
    describe_gauge!(names::DB_CONNECTIONS_IDLE, "Pool connections idle");
    describe_gauge!(names::DB_CONNECTIONS_TOTAL, "Pool connections owned");
    describe_gauge!(names::DB_CONNECTIONS_WAITING, "Callers waiting for a pool connection");
    describe_histogram!(
        names::OPERATION_DURATION,
        metrics::Unit::Seconds,
        "Duration of named business operations"
    );
    describe_counter!(names::OPERATION_ERRORS_TOTAL, "Failures of named business operations");
    describe_histogram!(
        names::DB_QUERY_DURATION,
        metrics::Unit::Seconds,
        "Database query latency in seconds"
    );
    describe_gauge!(names::RESOURCE_USAGE, "Resource usage level");
}
