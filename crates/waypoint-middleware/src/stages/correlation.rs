//! Correlation middleware.
//!
//! The first stage of the pipeline. It builds the request's
//! [`CorrelationContext`] and runs every later stage, and the handler, with
//! that context installed as ambient state.
//!
//! ## Identifier Sources
//!
//! - **Request ID**: `X-Request-ID` verbatim, else a generated UUID v4
//! - **Trace/span ID**: the active span, else an inbound `traceparent`
//!   (keeping its trace ID under a new span ID), else generated
//! - **User/session/tenant**: `X-User-ID`, `X-Session-ID`, `X-Tenant-ID`
//!
//! Besides the context's identifiers, the ambient diagnostic map carries the
//! request path and method.

use crate::context::MiddlewareContext;
use crate::meta::{header_str, REQUEST_ID_HEADER, SESSION_ID_HEADER, TENANT_ID_HEADER, USER_ID_HEADER};
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{HandlerResult, Request};
use http::HeaderMap;
use std::sync::Arc;
use waypoint_core::{
    generate_span_id, generate_trace_id, ContextPropagator, CorrelationContext, RequestId,
    TraceSource,
};
use waypoint_telemetry::{NoopTraceProvider, TraceContext, TraceProvider};

/// Middleware that assigns correlation identifiers and installs them as the
/// ambient context of the rest of the chain.
#[derive(Debug, Clone)]
pub struct CorrelationMiddleware {
    propagator: ContextPropagator,
    trace_provider: Arc<dyn TraceProvider>,
}

impl Default for CorrelationMiddleware {
    fn default() -> Self {
        Self::new(ContextPropagator::default(), Arc::new(NoopTraceProvider))
    }
}

impl CorrelationMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(propagator: ContextPropagator, trace_provider: Arc<dyn TraceProvider>) -> Self {
        Self {
            propagator,
            trace_provider,
        }
    }

    /// Builds the correlation context for a request with `headers`.
    #[must_use]
    pub fn correlate(&self, headers: &HeaderMap) -> CorrelationContext {
        let request_id = header_str(headers, REQUEST_ID_HEADER)
            .map_or_else(RequestId::generate, RequestId::from);
        let (trace_id, span_id, source) = self.trace_ids(headers);
        let owned = |name: &str| header_str(headers, name).map(str::to_string);

        CorrelationContext::new(request_id, trace_id, span_id)
            .with_user_id(owned(USER_ID_HEADER))
            .with_session_id(owned(SESSION_ID_HEADER))
            .with_tenant_id(owned(TENANT_ID_HEADER))
            .with_trace_source(source)
    }

    fn trace_ids(&self, headers: &HeaderMap) -> (String, String, TraceSource) {
        if let Some(span) = self.trace_provider.current_span() {
            return (span.trace_id, span.span_id, TraceSource::Active);
        }
        if let Some(parent) = TraceContext::from_headers(headers) {
            return (parent.trace_id, generate_span_id(), TraceSource::Propagated);
        }
        (generate_trace_id(), generate_span_id(), TraceSource::Generated)
    }
}

impl Middleware for CorrelationMiddleware {
    fn name(&self) -> &'static str {
        "correlation"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let context = Arc::new(self.correlate(request.headers()));
            ctx.set_correlation(Arc::clone(&context));

            let keys = self.propagator.keys();
            let diagnostics = self.propagator.diagnostics_for(&context).derive([
                (keys.path.clone(), request.uri().path().to_string()),
                (keys.method.clone(), request.method().as_str().to_string()),
            ]);

            tracing::debug!(request_id = %context.request_id(), "correlation context assigned");

            self.propagator
                .with_ambient_diagnostics(context, diagnostics, next.run(ctx, request))
                .await
        })
    }
}
