//! Trace identifier lookup and failure tagging.
//!
//! Waypoint does not export spans itself. It reads the identifiers of
//! whatever span is active when a request arrives, falls back to a W3C
//! `traceparent` header, and finally generates fresh identifiers. When a
//! request fails, the active span is tagged with the error.
//!
//! ## Trace Context Propagation
//!
//! Supports the [W3C Trace Context](https://www.w3.org/TR/trace-context/) header:
//! `{version}-{trace-id}-{parent-span-id}-{flags}`.

use http::HeaderMap;
use opentelemetry::trace::{Status, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use std::fmt::Debug;

/// The W3C Trace Context header for trace propagation.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Identifiers of an active span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanIds {
    /// 32 lowercase hex characters.
    pub trace_id: String,
    /// 16 lowercase hex characters.
    pub span_id: String,
}

/// Source of the active span and sink for failure tags.
pub trait TraceProvider: Send + Sync + Debug + 'static {
    /// Returns the identifiers of the active span, if any.
    fn current_span(&self) -> Option<SpanIds>;

    /// Marks the active span as failed.
    ///
    /// Without an active span this does nothing.
    fn record_error(&self, status: u16, kind: &str, message: &str);
}

/// [`TraceProvider`] backed by the OpenTelemetry context of the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtelTraceProvider;

impl TraceProvider for OtelTraceProvider {
    fn current_span(&self) -> Option<SpanIds> {
        let cx = Context::current();
        let span = cx.span();
        let span_context = span.span_context();
        if !span_context.is_valid() {
            return None;
        }
        Some(SpanIds {
            trace_id: span_context.trace_id().to_string(),
            span_id: span_context.span_id().to_string(),
        })
    }

    fn record_error(&self, status: u16, kind: &str, message: &str) {
        let cx = Context::current();
        let span = cx.span();
        if !span.span_context().is_valid() {
            return;
        }
        span.set_attribute(KeyValue::new("http.status_code", i64::from(status)));
        span.set_attribute(KeyValue::new("error.type", kind.to_string()));
        span.set_status(Status::error(message.to_string()));
    }
}

/// [`TraceProvider`] that never reports an active span.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTraceProvider;

impl TraceProvider for NoopTraceProvider {
    fn current_span(&self) -> Option<SpanIds> {
        None
    }

    fn record_error(&self, _status: u16, _kind: &str, _message: &str) {}
}

/// Parsed `traceparent` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    /// The 128-bit trace ID as a hex string.
    pub trace_id: String,
    /// The caller's span ID.
    pub parent_span_id: String,
    /// Trace flags (sampling, etc.).
    pub flags: TraceFlags,
}

impl TraceContext {
    /// Parses a `traceparent` header value.
    ///
    /// Returns `None` for anything but a well-formed version `00` value.
    /// All-zero trace or span identifiers are rejected.
    pub fn parse(value: &str) -> Option<Self> {
        let parts: Vec<&str> = value.trim().split('-').collect();
        let [version, trace_id, parent_span_id, flags] = parts.as_slice() else {
            return None;
        };

        if *version != "00" {
            return None;
        }
        if !is_hex_id(trace_id, 32) || !is_hex_id(parent_span_id, 16) {
            return None;
        }
        if flags.len() != 2 || !flags.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        let flags_byte = u8::from_str_radix(flags, 16).ok()?;

        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            parent_span_id: parent_span_id.to_ascii_lowercase(),
            flags: TraceFlags(flags_byte),
        })
    }

    /// Reads and parses the `traceparent` header, if present.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(TRACEPARENT_HEADER)?.to_str().ok()?;
        Self::parse(value)
    }
}

fn is_hex_id(value: &str, len: usize) -> bool {
    value.len() == len
        && value.chars().all(|c| c.is_ascii_hexdigit())
        && value.chars().any(|c| c != '0')
}

/// Trace flags from a `traceparent` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// No flags set.
    pub const NONE: Self = Self(0x00);
    /// The trace is sampled.
    pub const SAMPLED: Self = Self(0x01);

    /// Returns true if the sampled flag is set.
    #[must_use]
    pub const fn is_sampled(self) -> bool {
        self.0 & 0x01 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use opentelemetry::trace::{SpanContext, SpanId, TraceFlags as OtelFlags, TraceId, TraceState};

    const TRACE: &str = "0af7651916cd43dd8448eb211c80319c";
    const SPAN: &str = "b7ad6b7169203331";

    fn remote_context() -> Context {
        Context::current().with_remote_span_context(SpanContext::new(
            TraceId::from_hex(TRACE).unwrap(),
            SpanId::from_hex(SPAN).unwrap(),
            OtelFlags::SAMPLED,
            true,
            TraceState::default(),
        ))
    }

    #[test]
    fn test_parse_traceparent() {
        let context = TraceContext::parse(&format!("00-{TRACE}-{SPAN}-01")).unwrap();
        assert_eq!(context.trace_id, TRACE);
        assert_eq!(context.parent_span_id, SPAN);
        assert!(context.flags.is_sampled());
    }

    #[test]
    fn test_parse_traceparent_invalid_version() {
        assert!(TraceContext::parse(&format!("01-{TRACE}-{SPAN}-01")).is_none());
    }

    #[test]
    fn test_parse_traceparent_invalid_format() {
        assert!(TraceContext::parse("invalid").is_none());
        assert!(TraceContext::parse(&format!("00-{TRACE}-{SPAN}")).is_none());
        assert!(TraceContext::parse(&format!("00-{TRACE}-short-01")).is_none());
        assert!(TraceContext::parse(&format!("00-{}-{SPAN}-01", "0".repeat(32))).is_none());
    }

    #[test]
    fn test_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(TraceContext::from_headers(&headers).is_none());

        headers.insert(
            TRACEPARENT_HEADER,
            HeaderValue::from_str(&format!("00-{TRACE}-{SPAN}-00")).unwrap(),
        );
        let parsed = TraceContext::from_headers(&headers).unwrap();
        assert_eq!(parsed.trace_id, TRACE);
        assert!(!parsed.flags.is_sampled());
    }

    #[test]
    fn test_trace_flags() {
        assert!(!TraceFlags::NONE.is_sampled());
        assert!(TraceFlags::SAMPLED.is_sampled());
        assert!(TraceFlags(0x03).is_sampled());
    }

    #[test]
    fn test_otel_provider_without_span() {
        assert!(OtelTraceProvider.current_span().is_none());
        OtelTraceProvider.record_error(500, "Error", "boom");
    }

    #[test]
    fn test_otel_provider_reads_active_span() {
        let _guard = remote_context().attach();
        let ids = OtelTraceProvider.current_span().unwrap();
        assert_eq!(ids.trace_id, TRACE);
        assert_eq!(ids.span_id, SPAN);
        OtelTraceProvider.record_error(404, "NotFoundError", "missing");
    }

    #[test]
    fn test_noop_provider() {
        let _guard = remote_context().attach();
        assert!(NoopTraceProvider.current_span().is_none());
    }
}
