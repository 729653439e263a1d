//! The error envelope and its wire rendering.
//!
//! Every failed request answers with one flat JSON object:
//!
//! ```json
//! {"timestamp":"2026-03-01T12:00:00.123","path":"/accounts/42","status":400,
//!  "error":"Bad Request","message":"invalid amount","requestId":"abc-123",
//!  "traceId":null,"spanId":null,"processingTimeMs":3}
//! ```
//!
//! Rendering goes through an [`EnvelopeRenderer`] owned by the responder.
//! The default [`FlatJsonRenderer`] writes the object by hand, always in the
//! field order above, with absent optional fields as `null`.

use crate::classify::Classification;
use bytes::Bytes;
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::time::Duration;
use waypoint_core::CorrelationContext;

/// Timestamp layout: ISO-8601 local date-time with milliseconds.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// The body of an error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEnvelope {
    timestamp: DateTime<Local>,
    path: String,
    status: u16,
    error: String,
    message: String,
    request_id: Option<String>,
    trace_id: Option<String>,
    span_id: Option<String>,
    processing_time_ms: Option<u64>,
}

impl ErrorEnvelope {
    /// Assembles the envelope for a classified failure.
    ///
    /// Trace identifiers are included only when the context belongs to a
    /// real trace; `processing_time` only when the request's start was
    /// recorded.
    #[must_use]
    pub fn build(
        context: Option<&CorrelationContext>,
        path: &str,
        classification: &Classification,
        processing_time: Option<Duration>,
    ) -> Self {
        let traced = context.filter(|c| c.trace_source().is_traced());
        Self {
            timestamp: Local::now(),
            path: path.to_string(),
            status: classification.status.as_u16(),
            error: classification.reason_phrase.clone(),
            message: classification.message.clone(),
            request_id: context.map(|c| c.request_id().to_string()),
            trace_id: traced.map(|c| c.trace_id().to_string()),
            span_id: traced.map(|c| c.span_id().to_string()),
            processing_time_ms: processing_time
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    /// Sets the request ID when no correlation context was available.
    #[must_use]
    pub fn with_request_id_hint(mut self, request_id: Option<String>) -> Self {
        if self.request_id.is_none() {
            self.request_id = request_id;
        }
        self
    }

    /// When the envelope was built.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    /// The raw request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The response status.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The status reason phrase.
    #[must_use]
    pub fn error(&self) -> &str {
        &self.error
    }

    /// The client-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The request ID, if known.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// The trace ID, if the request was traced.
    #[must_use]
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// The span ID, if the request was traced.
    #[must_use]
    pub fn span_id(&self) -> Option<&str> {
        self.span_id.as_deref()
    }

    /// Milliseconds spent before the failure, if measured.
    #[must_use]
    pub fn processing_time_ms(&self) -> Option<u64> {
        self.processing_time_ms
    }
}

/// Serializes envelopes into response bodies.
pub trait EnvelopeRenderer: Send + Sync + std::fmt::Debug + 'static {
    /// Renders `envelope`.
    fn render(&self, envelope: &ErrorEnvelope) -> Bytes;

    /// The `Content-Type` of rendered bodies.
    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

/// Writes envelopes as one flat JSON object without a serialization framework.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatJsonRenderer;

impl EnvelopeRenderer for FlatJsonRenderer {
    fn render(&self, envelope: &ErrorEnvelope) -> Bytes {
        let mut object = FlatObject::new();
        object.string(
            "timestamp",
            &envelope.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        );
        object.string("path", &envelope.path);
        object.number("status", Some(u64::from(envelope.status)));
        object.string("error", &envelope.error);
        object.string("message", &envelope.message);
        object.optional_string("requestId", envelope.request_id.as_deref());
        object.optional_string("traceId", envelope.trace_id.as_deref());
        object.optional_string("spanId", envelope.span_id.as_deref());
        object.number("processingTimeMs", envelope.processing_time_ms);
        Bytes::from(object.finish())
    }
}

struct FlatObject {
    buf: String,
    empty: bool,
}

impl FlatObject {
    fn new() -> Self {
        Self {
            buf: String::from("{"),
            empty: true,
        }
    }

    fn key(&mut self, key: &str) {
        if !self.empty {
            self.buf.push(',');
        }
        self.empty = false;
        self.buf.push('"');
        escape_into(&mut self.buf, key);
        self.buf.push_str("\":");
    }

    fn string(&mut self, key: &str, value: &str) {
        self.optional_string(key, Some(value));
    }

    fn optional_string(&mut self, key: &str, value: Option<&str>) {
        self.key(key);
        match value {
            Some(value) => {
                self.buf.push('"');
                escape_into(&mut self.buf, value);
                self.buf.push('"');
            }
            None => self.buf.push_str("null"),
        }
    }

    fn number(&mut self, key: &str, value: Option<u64>) {
        self.key(key);
        match value {
            Some(value) => {
                let _ = write!(self.buf, "{value}");
            }
            None => self.buf.push_str("null"),
        }
    }

    fn finish(mut self) -> String {
        self.buf.push('}');
        self.buf
    }
}

/// Appends `value` to `out` with JSON string escaping.
pub fn escape_into(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if u32::from(c) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorClassifier;
    use serde_json::Value;
    use waypoint_core::{RequestFailure, RequestId, TraceSource};

    fn classification(message: &str) -> Classification {
        ErrorClassifier::new().classify(&RequestFailure::validation(message))
    }

    fn context(source: TraceSource) -> CorrelationContext {
        CorrelationContext::new(
            RequestId::from("abc-123"),
            "4bf92f3577b34da6a3ce929d0e0e4736",
            "00f067aa0ba902b7",
        )
        .with_trace_source(source)
    }

    fn render(envelope: &ErrorEnvelope) -> String {
        String::from_utf8(FlatJsonRenderer.render(envelope).to_vec()).unwrap()
    }

    #[test]
    fn test_render_field_order() {
        let ctx = context(TraceSource::Generated);
        let envelope = ErrorEnvelope::build(
            Some(&ctx),
            "/accounts/42",
            &classification("invalid amount"),
            Some(Duration::from_millis(12)),
        );
        let body = render(&envelope);

        let keys = [
            "\"timestamp\"",
            "\"path\"",
            "\"status\"",
            "\"error\"",
            "\"message\"",
            "\"requestId\"",
            "\"traceId\"",
            "\"spanId\"",
            "\"processingTimeMs\"",
        ];
        let positions: Vec<usize> = keys.iter().map(|k| body.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{body}");
        assert!(body.contains("\"status\":400,"));
        assert!(body.contains("\"error\":\"Bad Request\""));
        assert!(body.contains("\"processingTimeMs\":12}"));
    }

    #[test]
    fn test_render_is_valid_json() {
        let ctx = context(TraceSource::Propagated);
        let envelope = ErrorEnvelope::build(
            Some(&ctx),
            "/accounts/42",
            &classification("line one\nline \"two\"\t\\ end\u{1}"),
            None,
        );
        let parsed: Value = serde_json::from_str(&render(&envelope)).unwrap();

        assert_eq!(parsed["message"], "line one\nline \"two\"\t\\ end\u{1}");
        assert_eq!(parsed["requestId"], "abc-123");
        assert_eq!(parsed["traceId"], "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(parsed["spanId"], "00f067aa0ba902b7");
        assert_eq!(parsed["processingTimeMs"], Value::Null);
        assert_eq!(parsed.as_object().unwrap().len(), 9);
    }

    #[test]
    fn test_generated_trace_ids_not_echoed() {
        let ctx = context(TraceSource::Generated);
        let envelope = ErrorEnvelope::build(Some(&ctx), "/x", &classification("m"), None);
        assert!(envelope.trace_id().is_none());
        assert!(envelope.span_id().is_none());
        assert!(render(&envelope).contains("\"traceId\":null,\"spanId\":null"));
    }

    #[test]
    fn test_active_trace_ids_echoed() {
        let ctx = context(TraceSource::Active);
        let envelope = ErrorEnvelope::build(Some(&ctx), "/x", &classification("m"), None);
        assert_eq!(envelope.trace_id(), Some("4bf92f3577b34da6a3ce929d0e0e4736"));
    }

    #[test]
    fn test_request_id_hint_only_fills_gap() {
        let envelope = ErrorEnvelope::build(None, "/x", &classification("m"), None)
            .with_request_id_hint(Some("from-header".to_string()));
        assert_eq!(envelope.request_id(), Some("from-header"));

        let ctx = context(TraceSource::Generated);
        let envelope = ErrorEnvelope::build(Some(&ctx), "/x", &classification("m"), None)
            .with_request_id_hint(Some("from-header".to_string()));
        assert_eq!(envelope.request_id(), Some("abc-123"));
    }

    #[test]
    fn test_timestamp_format() {
        let envelope = ErrorEnvelope::build(None, "/x", &classification("m"), None);
        let parsed: Value = serde_json::from_str(&render(&envelope)).unwrap();
        let timestamp = parsed["timestamp"].as_str().unwrap();
        assert!(
            chrono::NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).is_ok(),
            "{timestamp}"
        );
        assert_eq!(parsed["requestId"], Value::Null);
    }

    #[test]
    fn test_escape_control_characters() {
        let mut out = String::new();
        escape_into(&mut out, "a\u{0}b\u{1f}c\r");
        assert_eq!(out, "a\\u0000b\\u001fc\\r");
    }
}
