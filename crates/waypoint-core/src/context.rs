//! Correlation context types.
//!
//! The [`CorrelationContext`] carries the identifiers of one logical request.
//! It is built once at request entry and shared read-only (behind an `Arc`)
//! with every continuation of that request.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A request identifier.
///
/// Client-supplied identifiers are kept verbatim; when the client sends none,
/// a random UUID v4 in its hyphenated textual form is generated.
///
/// # Example
///
/// ```
/// use waypoint_core::RequestId;
///
/// let supplied = RequestId::from("abc-123");
/// assert_eq!(supplied.as_str(), "abc-123");
///
/// let generated = RequestId::generate();
/// assert_eq!(generated.as_str().len(), 36);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generates a fresh request ID (UUID v4).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Where the trace and span identifiers of a context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceSource {
    /// Read from the span that was active when the request arrived.
    Active,
    /// Continued from an inbound `traceparent` header.
    Propagated,
    /// Generated locally because no trace existed.
    Generated,
}

impl TraceSource {
    /// Returns true when the identifiers belong to a real distributed trace.
    #[must_use]
    pub const fn is_traced(self) -> bool {
        matches!(self, Self::Active | Self::Propagated)
    }
}

/// Immutable identifiers of one logical request.
///
/// Builder-style `with_*` methods are only used while the context is being
/// assembled. Once it is shared it is never mutated; per-call enrichment goes
/// through [`Diagnostics::derive`](crate::Diagnostics::derive) instead.
///
/// # Example
///
/// ```
/// use waypoint_core::{CorrelationContext, RequestId, TraceSource};
///
/// let ctx = CorrelationContext::new(RequestId::from("r-1"), "t".repeat(32), "s".repeat(16))
///     .with_tenant_id(Some("acme".to_string()));
///
/// assert_eq!(ctx.request_id().as_str(), "r-1");
/// assert_eq!(ctx.tenant_id(), Some("acme"));
/// assert_eq!(ctx.trace_source(), TraceSource::Generated);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationContext {
    request_id: RequestId,
    trace_id: String,
    span_id: String,
    user_id: Option<String>,
    session_id: Option<String>,
    tenant_id: Option<String>,
    trace_source: TraceSource,
}

impl CorrelationContext {
    /// Creates a context from the mandatory identifiers.
    ///
    /// The trace source defaults to [`TraceSource::Generated`].
    #[must_use]
    pub fn new(request_id: RequestId, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            request_id,
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            user_id: None,
            session_id: None,
            tenant_id: None,
            trace_source: TraceSource::Generated,
        }
    }

    /// Creates a context where every identifier is freshly generated.
    #[must_use]
    pub fn generated() -> Self {
        Self::new(RequestId::generate(), generate_trace_id(), generate_span_id())
    }

    /// Sets the user ID.
    #[must_use]
    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Sets the session ID.
    #[must_use]
    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Sets the tenant ID.
    #[must_use]
    pub fn with_tenant_id(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    /// Records where the trace identifiers came from.
    #[must_use]
    pub fn with_trace_source(mut self, source: TraceSource) -> Self {
        self.trace_source = source;
        self
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Returns the trace ID.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Returns the span ID.
    #[must_use]
    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    /// Returns the user ID, if the request carried one.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Returns the session ID, if the request carried one.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Returns the tenant ID, if the request carried one.
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Returns where the trace identifiers came from.
    #[must_use]
    pub fn trace_source(&self) -> TraceSource {
        self.trace_source
    }
}

/// Generates a 32-character lowercase hex trace ID.
#[must_use]
pub fn generate_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Generates a 16-character lowercase hex span ID.
#[must_use]
pub fn generate_span_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}
