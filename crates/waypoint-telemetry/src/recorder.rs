//! Low-cardinality request metrics.
//!
//! [`MetricTagSet`] turns a raw request into bounded tag values and
//! [`MetricsRecorder`] emits them to a [`MetricsSink`]. Recording is
//! fire-and-forget: a failing sink is reported once through `tracing` and
//! otherwise ignored.

use crate::metrics::{names, GlobalMetricsSink, MetricsSink, Tag};
use crate::MetricsError;
use regex::Regex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use waypoint_core::{short_type_name, OutcomeBucket};

/// Placeholder for UUID-shaped path segments.
pub const UUID_PLACEHOLDER: &str = "{uuid}";

/// Placeholder for all-digit path segments.
pub const ID_PLACEHOLDER: &str = "{id}";

const UUID_PATTERN: &str = r"^(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$";

fn is_uuid_segment(segment: &str) -> bool {
    static UUID: OnceLock<Regex> = OnceLock::new();
    UUID.get_or_init(|| Regex::new(UUID_PATTERN).expect("valid regex"))
        .is_match(segment)
}

/// Replaces identifier segments of `path` with placeholders.
///
/// UUID-shaped segments become `{uuid}` and all-digit segments become
/// `{id}`. Applying it twice yields the same result as applying it once.
///
/// ```
/// use waypoint_telemetry::recorder::normalize_path;
///
/// assert_eq!(normalize_path("/users/123"), "/users/{id}");
/// assert_eq!(
///     normalize_path("/orders/550e8400-e29b-41d4-a716-446655440000"),
///     "/orders/{uuid}",
/// );
/// ```
#[must_use]
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if is_uuid_segment(segment) {
                UUID_PLACEHOLDER
            } else if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                ID_PLACEHOLDER
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

const STANDARD_METHODS: [&str; 9] =
    ["GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH"];

/// Maps methods outside the standard set to `OTHER`.
fn normalize_method(method: String) -> String {
    if STANDARD_METHODS.contains(&method.as_str()) {
        method
    } else {
        "OTHER".to_string()
    }
}

/// The tags attached to request metrics.
///
/// [`pairs`](Self::pairs) always yields them in the order `path`, `method`,
/// `status`, `outcome`, `exception`, `tenant`, skipping the optional ones
/// when unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricTagSet {
    path: String,
    method: String,
    status: u16,
    outcome: OutcomeBucket,
    exception: Option<String>,
    tenant: Option<String>,
}

impl MetricTagSet {
    /// Builds the tags for a request. `raw_path` is normalized and
    /// non-standard methods are tagged `OTHER`.
    #[must_use]
    pub fn new(raw_path: &str, method: impl Into<String>, status: u16) -> Self {
        Self {
            path: normalize_path(raw_path),
            method: normalize_method(method.into()),
            status,
            outcome: OutcomeBucket::from_status_code(status),
            exception: None,
            tenant: None,
        }
    }

    /// Adds the failure's kind name.
    #[must_use]
    pub fn with_exception(mut self, kind: impl Into<String>) -> Self {
        self.exception = Some(kind.into());
        self
    }

    /// Adds the tenant tag.
    #[must_use]
    pub fn with_tenant(mut self, tenant: Option<String>) -> Self {
        self.tenant = tenant;
        self
    }

    /// Returns the normalized path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns the outcome bucket.
    #[must_use]
    pub fn outcome(&self) -> OutcomeBucket {
        self.outcome
    }

    /// Returns the exception tag, if set.
    #[must_use]
    pub fn exception(&self) -> Option<&str> {
        self.exception.as_deref()
    }

    /// Returns the tags as key/value pairs in canonical order.
    #[must_use]
    pub fn pairs(&self) -> Vec<Tag> {
        let mut pairs = vec![
            ("path", self.path.clone()),
            ("method", self.method.clone()),
            ("status", self.status.to_string()),
            ("outcome", self.outcome.as_str().to_string()),
        ];
        if let Some(exception) = &self.exception {
            pairs.push(("exception", exception.clone()));
        }
        if let Some(tenant) = &self.tenant {
            pairs.push(("tenant", tenant.clone()));
        }
        pairs
    }
}

/// Connection pool levels for [`MetricsRecorder::record_pool_gauges`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections in use.
    pub active: u32,
    /// Connections idle.
    pub idle: u32,
    /// Connections owned by the pool.
    pub total: u32,
    /// Callers waiting for a connection.
    pub waiting: u32,
}

/// Result of a named operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOutcome<'a> {
    /// The operation finished normally.
    Success,
    /// The operation failed with the given kind.
    Failed(&'a str),
}

impl OperationOutcome<'_> {
    fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed(_) => "error",
        }
    }
}

/// Emits request, cache, pool and operation metrics.
#[derive(Clone)]
pub struct MetricsRecorder {
    sink: Arc<dyn MetricsSink>,
    enabled: bool,
    sink_failed: Arc<AtomicBool>,
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("enabled", &self.enabled)
            .field("sink_failed", &self.sink_failed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new(Arc::new(GlobalMetricsSink))
    }
}

impl MetricsRecorder {
    /// Creates a recorder writing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            sink,
            enabled: true,
            sink_failed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Turns recording on or off.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns whether recording is on.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records one handled request.
    pub fn record_request(&self, tags: &MetricTagSet, duration: Duration) {
        if !self.enabled {
            return;
        }
        let pairs = tags.pairs();
        self.emit(self.sink.increment_counter(names::HTTP_REQUESTS_TOTAL, &pairs));
        self.emit(self.sink.record_timer(names::HTTP_REQUEST_DURATION, &pairs, duration));
    }

    /// Records one failed request under `failure_kind`.
    pub fn record_error(&self, tags: &MetricTagSet, failure_kind: &str) {
        if !self.enabled {
            return;
        }
        let tags = tags.clone().with_exception(failure_kind);
        self.emit(self.sink.increment_counter(names::HTTP_ERRORS_TOTAL, &tags.pairs()));
    }

    /// Records a cache lookup.
    pub fn record_cache_access(&self, cache: &str, hit: bool) {
        if !self.enabled {
            return;
        }
        let result = if hit { "hit" } else { "miss" };
        let tags = [("cache", cache.to_string()), ("result", result.to_string())];
        self.emit(self.sink.increment_counter(names::CACHE_ACCESS_TOTAL, &tags));
    }

    /// Sets the four connection pool gauges for `pool`.
    pub fn record_pool_gauges(&self, pool: &str, stats: PoolStats) {
        if !self.enabled {
            return;
        }
        let tags = [("pool", pool.to_string())];
        for (name, value) in [
            (names::DB_CONNECTIONS_ACTIVE, stats.active),
            (names::DB_CONNECTIONS_IDLE, stats.idle),
            (names::DB_CONNECTIONS_TOTAL, stats.total),
            (names::DB_CONNECTIONS_WAITING, stats.waiting),
        ] {
            self.emit(self.sink.set_gauge(name, &tags, f64::from(value)));
        }
    }

    /// Records the duration of a named operation.
    ///
    /// Failed operations also increment `operation_errors_total`.
    pub fn record_operation(
        &self,
        operation: &str,
        outcome: OperationOutcome<'_>,
        duration: Duration,
        extra: &[Tag],
    ) {
        if !self.enabled {
            return;
        }
        let mut tags: Vec<Tag> = vec![
            ("operation", operation.to_string()),
            ("outcome", outcome.as_str().to_string()),
        ];
        tags.extend(extra.iter().cloned());
        self.emit(self.sink.record_timer(names::OPERATION_DURATION, &tags, duration));

        if let OperationOutcome::Failed(kind) = outcome {
            let mut tags: Vec<Tag> = vec![
                ("operation", operation.to_string()),
                ("exception", kind.to_string()),
            ];
            tags.extend(extra.iter().cloned());
            self.emit(self.sink.increment_counter(names::OPERATION_ERRORS_TOTAL, &tags));
        }
    }

    /// Runs `work` and records its duration and outcome as `operation`.
    ///
    /// The error's type name becomes the `exception` tag.
    pub async fn time_operation<F, T, E>(&self, operation: &str, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let started = tokio::time::Instant::now();
        let result = work.await;
        let outcome = match &result {
            Ok(_) => OperationOutcome::Success,
            Err(_) => OperationOutcome::Failed(short_type_name(std::any::type_name::<E>())),
        };
        self.record_operation(operation, outcome, started.elapsed(), &[]);
        result
    }

    /// Records a database query latency.
    pub fn record_database_latency(&self, operation: &str, table: Option<&str>, duration: Duration) {
        if !self.enabled {
            return;
        }
        let mut tags: Vec<Tag> = vec![("operation", operation.to_string())];
        if let Some(table) = table {
            tags.push(("table", table.to_string()));
        }
        self.emit(self.sink.record_timer(names::DB_QUERY_DURATION, &tags, duration));
    }

    /// Sets the usage level of `resource`, optionally per tenant.
    pub fn record_resource_usage(&self, resource: &str, tenant: Option<&str>, value: f64) {
        if !self.enabled {
            return;
        }
        let mut tags: Vec<Tag> = vec![("resource", resource.to_string())];
        if let Some(tenant) = tenant {
            tags.push(("tenant", tenant.to_string()));
        }
        self.emit(self.sink.set_gauge(names::RESOURCE_USAGE, &tags, value));
    }

    fn emit(&self, result: Result<(), MetricsError>) {
        let Err(error) = result else {
            return;
        };
        if self.sink_failed.swap(true, Ordering::Relaxed) {
            tracing::trace!(error = %error, "metrics sink rejected observation");
        } else {
            tracing::warn!(
                error = %error,
                "metrics sink rejected observation; further rejections are logged at trace level"
            );
        }
    }
}
