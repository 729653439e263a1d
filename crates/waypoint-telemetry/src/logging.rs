//! Structured JSON logging for Waypoint.
//!
//! Every JSON log line is merged with the ambient diagnostic map of the
//! request whose future emitted it, so identifiers such as `requestId` appear
//! on lines written by application code that never sees the request.
//!
//! # Example
//!
//! ```rust,ignore
//! use waypoint_telemetry::logging::{LogConfig, init_logging};
//!
//! init_logging(&LogConfig::production())?;
//!
//! tracing::info!(order_id = 42, "order accepted");
//! // {"timestamp":"…","level":"INFO","target":"shop","service":"waypoint",
//! //  "message":"order accepted","order_id":42,"requestId":"…","traceId":"…",…}
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{FmtSpan, FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use waypoint_core::propagation;

/// Tracing target used for request lifecycle events.
pub const LIFECYCLE_TARGET: &str = "waypoint::lifecycle";

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line, enriched with diagnostics.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Log level or filter directive (e.g., "info", "waypoint=debug").
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Whether to include span events (enter, exit, close).
    pub span_events: bool,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include target (module path).
    pub include_target: bool,

    /// Service name written on every JSON line.
    pub service_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// Creates a development configuration with human-readable output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            span_events: true,
            file_line_info: true,
            include_target: true,
            service_name: "waypoint".to_string(),
        }
    }

    /// Creates a production configuration with JSON output.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
            span_events: false,
            file_line_info: false,
            include_target: true,
            service_name: "waypoint".to_string(),
        }
    }
}

/// Initializes the global logging subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the level is not a valid filter
/// or a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match config.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_span_events(span_events)
                .event_format(DiagnosticJsonFormat::from_config(config))
                .with_filter(filter);

            tracing_subscriber::registry()
                .with(fmt_layer)
                .try_init()
                .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_span_events(span_events)
                .with_file(config.file_line_info)
                .with_line_number(config.file_line_info)
                .with_target(config.include_target)
                .with_filter(filter);

            tracing_subscriber::registry()
                .with(fmt_layer)
                .try_init()
                .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
        }
    }

    Ok(())
}

/// Creates an env filter from a string.
///
/// # Errors
///
/// Returns error if the filter string is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| TelemetryError::LoggingInit(format!("Invalid log level: {e}")))
}

/// JSON event formatter that merges the ambient diagnostic map.
///
/// Event fields take precedence over diagnostic entries with the same key.
#[derive(Debug, Clone)]
pub struct DiagnosticJsonFormat {
    service_name: String,
    include_target: bool,
    file_line_info: bool,
}

impl DiagnosticJsonFormat {
    /// Creates a formatter for `service_name`.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            include_target: true,
            file_line_info: false,
        }
    }

    /// Creates a formatter from a logging configuration.
    #[must_use]
    pub fn from_config(config: &LogConfig) -> Self {
        Self {
            service_name: config.service_name.clone(),
            include_target: config.include_target,
            file_line_info: config.file_line_info,
        }
    }

    /// Renders one event as a JSON object.
    pub fn render(&self, event: &Event<'_>) -> Value {
        let meta = event.metadata();
        let mut map = Map::new();

        map.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        map.insert("level".to_string(), Value::String(meta.level().to_string()));
        if self.include_target {
            map.insert("target".to_string(), Value::String(meta.target().to_string()));
        }
        if self.file_line_info {
            if let Some(file) = meta.file() {
                map.insert("file".to_string(), Value::String(file.to_string()));
            }
            if let Some(line) = meta.line() {
                map.insert("line".to_string(), Value::from(line));
            }
        }
        map.insert("service".to_string(), Value::String(self.service_name.clone()));

        event.record(&mut JsonFields::new(&mut map));

        if let Some(diagnostics) = propagation::current_diagnostics() {
            for (key, value) in diagnostics.iter() {
                map.entry(key.to_string())
                    .or_insert_with(|| Value::String(value.to_string()));
            }
        }

        Value::Object(map)
    }
}

impl<S, N> FormatEvent<S, N> for DiagnosticJsonFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        writeln!(writer, "{}", self.render(event))
    }
}

/// Field visitor that collects event fields into a JSON map.
pub(crate) struct JsonFields<'a> {
    map: &'a mut Map<String, Value>,
}

impl<'a> JsonFields<'a> {
    pub(crate) fn new(map: &'a mut Map<String, Value>) -> Self {
        Self { map }
    }

    fn insert(&mut self, field: &Field, value: Value) {
        self.map.insert(field.name().to_string(), value);
    }
}

impl Visit for JsonFields<'_> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }
}

/// Standard log fields for Waypoint.
///
/// Use these field names for consistency across logs.
pub mod fields {
    /// Request ID field name.
    pub const REQUEST_ID: &str = "request_id";

    /// Trace ID field name.
    pub const TRACE_ID: &str = "trace_id";

    /// Span ID field name.
    pub const SPAN_ID: &str = "span_id";

    /// User ID field name.
    pub const USER_ID: &str = "user_id";

    /// Session ID field name.
    pub const SESSION_ID: &str = "session_id";

    /// Tenant ID field name.
    pub const TENANT_ID: &str = "tenant_id";

    /// HTTP method field name.
    pub const HTTP_METHOD: &str = "http.method";

    /// HTTP path field name.
    pub const HTTP_PATH: &str = "http.path";

    /// HTTP status code field name.
    pub const HTTP_STATUS: &str = "http.status_code";

    /// Duration field name (in milliseconds).
    pub const DURATION_MS: &str = "duration_ms";

    /// Outcome bucket field name.
    pub const OUTCOME: &str = "outcome";

    /// Lifecycle phase field name.
    pub const LIFECYCLE: &str = "lifecycle";

    /// Error field name.
    pub const ERROR: &str = "error";
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tracing_subscriber::fmt::MakeWriter;
    use waypoint_core::ContextPropagator;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl Buffer {
        fn lines(&self) -> Vec<Value> {
            String::from_utf8(self.0.lock().clone())
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    fn subscriber(buffer: &Buffer) -> impl Subscriber + Send + Sync {
        tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .event_format(DiagnosticJsonFormat::new("payments"))
                .with_writer(buffer.clone()),
        )
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_development_config() {
        let config = LogConfig::development();
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.span_events);
        assert_eq!(config.level, "debug");
    }

    #[test]
    fn test_create_env_filter() {
        assert!(create_env_filter("info,waypoint=debug").is_ok());
        assert!(create_env_filter("info,[[[").is_err());
    }

    #[test]
    fn test_disabled_logging() {
        let config = LogConfig {
            enabled: false,
            ..LogConfig::default()
        };
        assert!(init_logging(&config).is_ok());
    }

    #[test]
    fn test_json_subscriber_with_span_events_installs_once() {
        let config = LogConfig {
            span_events: true,
            ..LogConfig::production()
        };
        assert_eq!(config.format, LogFormat::Json);
        assert!(init_logging(&config).is_ok());
        assert!(matches!(
            init_logging(&config),
            Err(TelemetryError::LoggingInit(_))
        ));
    }

    #[test]
    fn test_json_line_carries_ambient_diagnostics() {
        let buffer = Buffer::default();
        let propagator = ContextPropagator::default();
        let ctx = Arc::new(ContextPropagator::create(
            "req-42",
            "0af7651916cd43dd8448eb211c80319c",
            "b7ad6b7169203331",
            None,
            None,
            Some("acme".to_string()),
        ));

        tracing::subscriber::with_default(subscriber(&buffer), || {
            tokio_test::block_on(propagator.with_ambient_context(ctx, async {
                tracing::info!(amount = 125, "charge accepted");
            }));
            tracing::info!("outside any request");
        });

        let lines = buffer.lines();
        assert_eq!(lines.len(), 2);

        let inside = &lines[0];
        assert_eq!(inside["message"], "charge accepted");
        assert_eq!(inside["amount"], 125);
        assert_eq!(inside["service"], "payments");
        assert_eq!(inside["level"], "INFO");
        assert_eq!(inside["requestId"], "req-42");
        assert_eq!(inside["traceId"], "0af7651916cd43dd8448eb211c80319c");
        assert_eq!(inside["tenantId"], "acme");

        let outside = &lines[1];
        assert!(outside.get("requestId").is_none());
    }

    #[test]
    fn test_event_fields_win_over_diagnostics() {
        let buffer = Buffer::default();
        let propagator = ContextPropagator::default();
        let ctx = Arc::new(ContextPropagator::create("ambient", "t", "s", None, None, None));

        tracing::subscriber::with_default(subscriber(&buffer), || {
            tokio_test::block_on(propagator.with_ambient_context(ctx, async {
                tracing::info!(requestId = "explicit", "override");
            }));
        });

        assert_eq!(buffer.lines()[0]["requestId"], "explicit");
    }
}
