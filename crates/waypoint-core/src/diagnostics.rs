//! Diagnostic key/value maps attached to log output.

use crate::context::CorrelationContext;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Names under which each identifier is published in the diagnostic map.
///
/// The defaults match the camelCase keys most log pipelines already index on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DiagnosticKeys {
    /// Key for the request ID.
    pub request_id: String,
    /// Key for the trace ID.
    pub trace_id: String,
    /// Key for the span ID.
    pub span_id: String,
    /// Key for the user ID.
    pub user_id: String,
    /// Key for the session ID.
    pub session_id: String,
    /// Key for the tenant ID.
    pub tenant_id: String,
    /// Key for the name of a nested operation.
    pub operation: String,
    /// Key for the request path.
    pub path: String,
    /// Key for the request method.
    pub method: String,
}

impl Default for DiagnosticKeys {
    fn default() -> Self {
        Self {
            request_id: "requestId".to_string(),
            trace_id: "traceId".to_string(),
            span_id: "spanId".to_string(),
            user_id: "userId".to_string(),
            session_id: "sessionId".to_string(),
            tenant_id: "tenantId".to_string(),
            operation: "operation".to_string(),
            path: "path".to_string(),
            method: "method".to_string(),
        }
    }
}

impl DiagnosticKeys {
    /// Returns every configured key, in declaration order.
    #[must_use]
    pub fn all(&self) -> [&str; 9] {
        [
            self.request_id.as_str(),
            self.trace_id.as_str(),
            self.span_id.as_str(),
            self.user_id.as_str(),
            self.session_id.as_str(),
            self.tenant_id.as_str(),
            self.operation.as_str(),
            self.path.as_str(),
            self.method.as_str(),
        ]
    }
}

/// An insertion-ordered diagnostic map.
///
/// Maps are never mutated once installed as ambient state. Enrichment
/// produces a child map with [`derive`](Self::derive); the child keeps
/// every entry of its parent unchanged.
///
/// # Example
///
/// ```
/// use waypoint_core::Diagnostics;
///
/// let parent = Diagnostics::from_pairs([("requestId", "r-1")]);
/// let child = parent.derive([("operation", "charge"), ("requestId", "ignored")]);
///
/// assert_eq!(child.get("requestId"), Some("r-1"));
/// assert_eq!(child.get("operation"), Some("charge"));
/// assert!(parent.get("operation").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: IndexMap<String, String>,
}

impl Diagnostics {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from key/value pairs. Later duplicates are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new().derive(pairs)
    }

    /// Publishes a context's identifiers under the configured keys.
    ///
    /// Absent optional identifiers produce no entry.
    #[must_use]
    pub fn from_context(context: &CorrelationContext, keys: &DiagnosticKeys) -> Self {
        let mut entries = IndexMap::new();
        entries.insert(keys.request_id.clone(), context.request_id().to_string());
        entries.insert(keys.trace_id.clone(), context.trace_id().to_string());
        entries.insert(keys.span_id.clone(), context.span_id().to_string());

        let optional = [
            (&keys.user_id, context.user_id()),
            (&keys.session_id, context.session_id()),
            (&keys.tenant_id, context.tenant_id()),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                entries.insert(key.clone(), value.to_string());
            }
        }

        Self { entries }
    }

    /// Returns a child map with additional entries.
    ///
    /// Keys already present keep their existing value.
    #[must_use]
    pub fn derive<I, K, V>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries = self.entries.clone();
        for (key, value) in extra {
            entries.entry(key.into()).or_insert_with(|| value.into());
        }
        Self { entries }
    }

    /// Looks up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestId;

    fn context() -> CorrelationContext {
        CorrelationContext::new(RequestId::from("req-9"), "trace-9", "span-9")
            .with_user_id(Some("alice".to_string()))
    }

    #[test]
    fn test_default_keys() {
        let keys = DiagnosticKeys::default();
        assert_eq!(keys.request_id, "requestId");
        assert_eq!(keys.tenant_id, "tenantId");
        assert_eq!(keys.all().len(), 9);
    }

    #[test]
    fn test_from_context_skips_absent_identifiers() {
        let diagnostics = Diagnostics::from_context(&context(), &DiagnosticKeys::default());

        assert_eq!(diagnostics.get("requestId"), Some("req-9"));
        assert_eq!(diagnostics.get("traceId"), Some("trace-9"));
        assert_eq!(diagnostics.get("userId"), Some("alice"));
        assert!(diagnostics.get("tenantId").is_none());
        assert_eq!(diagnostics.len(), 4);
    }

    #[test]
    fn test_custom_key_names() {
        let keys = DiagnosticKeys {
            request_id: "rid".to_string(),
            ..DiagnosticKeys::default()
        };
        let diagnostics = Diagnostics::from_context(&context(), &keys);
        assert_eq!(diagnostics.get("rid"), Some("req-9"));
        assert!(diagnostics.get("requestId").is_none());
    }

    #[test]
    fn test_derive_never_overwrites() {
        let parent = Diagnostics::from_context(&context(), &DiagnosticKeys::default());
        let child = parent.derive([("requestId", "hijacked"), ("operation", "refund")]);

        assert_eq!(child.get("requestId"), Some("req-9"));
        assert_eq!(child.get("operation"), Some("refund"));
        assert_eq!(parent.len() + 1, child.len());
    }

    #[test]
    fn test_keys_deserialize_with_defaults() {
        let keys: DiagnosticKeys = serde_json::from_str(r#"{"request_id": "X-Req"}"#).unwrap();
        assert_eq!(keys.request_id, "X-Req");
        assert_eq!(keys.trace_id, "traceId");
    }

    #[test]
    fn test_keys_reject_unknown_fields() {
        let result: Result<DiagnosticKeys, _> = serde_json::from_str(r#"{"bogus": "x"}"#);
        assert!(result.is_err());
    }
}
