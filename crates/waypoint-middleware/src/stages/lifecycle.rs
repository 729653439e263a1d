//! Request lifecycle instrumentation.
//!
//! [`LifecycleRecorder::instrument`] wraps the processing of one request:
//!
//! 1. logs `request started` with the request's identifiers
//! 2. runs the handler
//! 3. on success logs `request completed`; on failure classifies the
//!    failure, renders the error envelope and logs `request failed`
//! 4. logs `slow request` when the duration is over the threshold
//! 5. records the request metrics
//!
//! Every request produces exactly one start and one terminal event on the
//! [`LIFECYCLE_TARGET`] target, plus the slow warning when it applies. A
//! request dropped before the handler finishes (the client went away) still
//! takes the failure branch, once, with a 499 status.
//!
//! ## Sampling
//!
//! `sample_rate` picks the requests whose start event also carries the
//! masked headers, query parameters and payload. Unsampled requests keep the
//! lifecycle events and metrics.

use crate::classify::{Classification, ErrorClassifier};
use crate::context::MiddlewareContext;
use crate::envelope::ErrorEnvelope;
use crate::meta::{RequestMeta, REQUEST_ID_HEADER, RESPONSE_TIME_HEADER, TRACE_ID_HEADER};
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::responder::ErrorResponder;
use crate::types::{HandlerResult, Request, Response};
use http::{HeaderMap, HeaderValue};
use http_body_util::{BodyExt, Full};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use waypoint_config::ObservabilityConfig;
use waypoint_core::{CorrelationContext, PendingLifecycle, RequestFailure, RequestLifecycleRecord};
use waypoint_telemetry::{
    MetricTagSet, MetricsRecorder, NoopTraceProvider, PayloadSanitizer, TraceProvider,
    LIFECYCLE_TARGET,
};

#[derive(Debug, Clone)]
struct Settings {
    sample_rate: f64,
    include_payload: bool,
    request_details: bool,
    include_headers: bool,
    include_query_params: bool,
    include_client_info: bool,
    response_details: bool,
    include_response_headers: bool,
    include_time_taken: bool,
    include_stack_trace: bool,
    include_request_details_on_error: bool,
    log_slow_requests: bool,
    slow_threshold: Duration,
}

impl Settings {
    fn from_config(config: &ObservabilityConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            include_payload: config.include_payload,
            request_details: config.request.enabled,
            include_headers: config.request.include_headers,
            include_query_params: config.request.include_query_params,
            include_client_info: config.request.include_client_info,
            response_details: config.response.enabled,
            include_response_headers: config.response.include_headers,
            include_time_taken: config.response.include_time_taken,
            include_stack_trace: config.error.include_stack_trace,
            include_request_details_on_error: config.error.include_request_details,
            log_slow_requests: config.metrics.log_slow_requests,
            slow_threshold: config.slow_request_threshold(),
        }
    }
}

/// Instruments the processing of requests.
///
/// Cheap to clone; clones share sinks.
#[derive(Debug, Clone)]
pub struct LifecycleRecorder {
    settings: Arc<Settings>,
    sanitizer: Arc<PayloadSanitizer>,
    responder: ErrorResponder,
    metrics: MetricsRecorder,
    trace_provider: Arc<dyn TraceProvider>,
}

impl Default for LifecycleRecorder {
    fn default() -> Self {
        Self::from_config(&ObservabilityConfig::default())
    }
}

/// Request detail logged with the start event.
#[derive(Debug, Default)]
struct StartDetail {
    client_addr: Option<String>,
    user_agent: Option<String>,
    query: Option<String>,
    headers: Option<String>,
    payload: Option<String>,
}

impl LifecycleRecorder {
    /// Creates a recorder from `config`, writing metrics to the global
    /// recorder and leaving spans untouched.
    #[must_use]
    pub fn from_config(config: &ObservabilityConfig) -> Self {
        Self {
            settings: Arc::new(Settings::from_config(config)),
            sanitizer: Arc::new(config.sanitizer()),
            responder: ErrorResponder::new(ErrorClassifier::from_config(&config.error)),
            metrics: MetricsRecorder::default().with_enabled(config.metrics.enabled),
            trace_provider: Arc::new(NoopTraceProvider),
        }
    }

    /// Replaces the metrics recorder.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replaces the trace provider tagged on failures.
    #[must_use]
    pub fn with_trace_provider(mut self, provider: Arc<dyn TraceProvider>) -> Self {
        self.trace_provider = provider;
        self
    }

    /// Replaces the error responder.
    #[must_use]
    pub fn with_responder(mut self, responder: ErrorResponder) -> Self {
        self.responder = responder;
        self
    }

    /// Returns the metrics recorder.
    #[must_use]
    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Returns true when request bodies may be logged.
    #[must_use]
    pub fn logs_payload(&self) -> bool {
        let s = &self.settings;
        s.include_payload && s.request_details && s.sample_rate > 0.0
    }

    /// Reads the request's metadata, buffering the body when it may be logged.
    pub async fn prepare(&self, request: Request) -> (Request, RequestMeta) {
        let mut meta = RequestMeta::from_request(&request);
        if !self.logs_payload() {
            return (request, meta);
        }

        let (parts, body) = request.into_parts();
        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };
        meta.body = Some(bytes.clone());
        (Request::from_parts(parts, Full::new(bytes)), meta)
    }

    /// Runs `handler` as the processing of the request described by `meta`.
    ///
    /// Always yields a response: failures come back as error envelopes.
    pub async fn instrument<F>(
        &self,
        context: &CorrelationContext,
        meta: &RequestMeta,
        handler: F,
    ) -> (Response, RequestLifecycleRecord)
    where
        F: Future<Output = HandlerResult>,
    {
        let pending = PendingLifecycle::start(&meta.method, &meta.path);
        let sampled = self.sample();
        self.log_started(context, meta, sampled);

        let guard = InFlight {
            recorder: self,
            context,
            meta,
            pending: &pending,
            armed: true,
        };
        let result = handler.await;
        guard.disarm();

        match result {
            Ok(response) => self.finish_success(context, meta, &pending, sampled, response),
            Err(failure) => self.finish_failure(context, meta, &pending, &failure),
        }
    }

    fn sample(&self) -> bool {
        let rate = self.settings.sample_rate;
        rate >= 1.0 || (rate > 0.0 && fastrand::f64() < rate)
    }

    fn finish_success(
        &self,
        context: &CorrelationContext,
        meta: &RequestMeta,
        pending: &PendingLifecycle,
        sampled: bool,
        mut response: Response,
    ) -> (Response, RequestLifecycleRecord) {
        let record = pending.finish(response.status().as_u16(), self.settings.slow_threshold);

        let response_headers = (sampled
            && self.settings.response_details
            && self.settings.include_response_headers)
            .then(|| self.render_headers(response.headers()));
        self.decorate(&mut response, context, &record);

        tracing::info!(
            target: LIFECYCLE_TARGET,
            lifecycle = "completed",
            request_id = %context.request_id(),
            trace_id = context.trace_id(),
            span_id = context.span_id(),
            http.method = %meta.method,
            http.path = %meta.path,
            http.status_code = record.status_code(),
            duration_ms = record.duration_millis(),
            outcome = record.outcome().as_str(),
            response_headers = response_headers.as_deref(),
            "request completed"
        );
        self.log_slow(context, meta, &record);
        self.record_metrics(context, meta, &record, None);

        (response, record)
    }

    fn finish_failure(
        &self,
        context: &CorrelationContext,
        meta: &RequestMeta,
        pending: &PendingLifecycle,
        failure: &RequestFailure,
    ) -> (Response, RequestLifecycleRecord) {
        let classification = self.responder.classifier().classify(failure);
        let record = pending.finish(classification.status.as_u16(), self.settings.slow_threshold);

        let envelope = ErrorEnvelope::build(
            Some(context),
            &meta.path,
            &classification,
            Some(record.duration()),
        );
        let mut response = self.responder.render(&envelope, &classification);
        self.decorate(&mut response, context, &record);

        self.trace_provider.record_error(
            classification.status.as_u16(),
            &classification.kind,
            &classification.message,
        );
        self.log_failed(context, meta, &record, failure, &classification);
        self.log_slow(context, meta, &record);
        self.record_metrics(context, meta, &record, Some(&classification.kind));

        (response, record)
    }

    fn decorate(
        &self,
        response: &mut Response,
        context: &CorrelationContext,
        record: &RequestLifecycleRecord,
    ) {
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(context.request_id().as_str()) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
        if let Ok(value) = HeaderValue::from_str(context.trace_id()) {
            headers.insert(TRACE_ID_HEADER, value);
        }
        if self.settings.include_time_taken {
            if let Ok(value) = HeaderValue::from_str(&format!("{}ms", record.duration_millis())) {
                headers.insert(RESPONSE_TIME_HEADER, value);
            }
        }
    }

    fn log_started(&self, context: &CorrelationContext, meta: &RequestMeta, sampled: bool) {
        let detail = self.start_detail(meta, sampled);
        tracing::info!(
            target: LIFECYCLE_TARGET,
            lifecycle = "started",
            request_id = %context.request_id(),
            trace_id = context.trace_id(),
            span_id = context.span_id(),
            user_id = context.user_id(),
            session_id = context.session_id(),
            tenant_id = context.tenant_id(),
            http.method = %meta.method,
            http.path = %meta.path,
            client_addr = detail.client_addr.as_deref(),
            user_agent = detail.user_agent.as_deref(),
            query = detail.query.as_deref(),
            headers = detail.headers.as_deref(),
            payload = detail.payload.as_deref(),
            "request started"
        );
    }

    fn start_detail(&self, meta: &RequestMeta, sampled: bool) -> StartDetail {
        let s = &self.settings;
        if !s.request_details {
            return StartDetail::default();
        }

        let mut detail = StartDetail::default();
        if s.include_client_info {
            detail.client_addr.clone_from(&meta.client_addr);
            detail.user_agent.clone_from(&meta.user_agent);
        }
        if !sampled {
            return detail;
        }

        if s.include_headers {
            detail.headers = Some(self.render_headers(&meta.headers));
        }
        if s.include_query_params {
            detail.query = meta
                .query
                .as_deref()
                .map(|q| Value::Object(self.sanitizer.sanitize_query(q)).to_string());
        }
        if s.include_payload {
            detail.payload = meta
                .body
                .as_deref()
                .filter(|body| !body.is_empty())
                .map(|body| self.sanitizer.sanitize_body(body));
        }
        detail
    }

    fn render_headers(&self, headers: &HeaderMap) -> String {
        Value::Object(self.sanitizer.sanitize_headers(headers)).to_string()
    }

    fn log_failed(
        &self,
        context: &CorrelationContext,
        meta: &RequestMeta,
        record: &RequestLifecycleRecord,
        failure: &RequestFailure,
        classification: &Classification,
    ) {
        let s = &self.settings;
        let chain = s
            .include_stack_trace
            .then(|| failure.chain().join("\ncaused by: "));
        let (client_addr, user_agent) = if s.include_request_details_on_error {
            (meta.client_addr.as_deref(), meta.user_agent.as_deref())
        } else {
            (None, None)
        };

        tracing::error!(
            target: LIFECYCLE_TARGET,
            lifecycle = "failed",
            request_id = %context.request_id(),
            trace_id = context.trace_id(),
            span_id = context.span_id(),
            http.method = %meta.method,
            http.path = %meta.path,
            http.status_code = record.status_code(),
            duration_ms = record.duration_millis(),
            outcome = record.outcome().as_str(),
            error = %failure,
            error_kind = %classification.kind,
            error_chain = chain.as_deref(),
            client_addr,
            user_agent,
            "request failed"
        );
    }

    fn log_slow(&self, context: &CorrelationContext, meta: &RequestMeta, record: &RequestLifecycleRecord) {
        if !self.settings.log_slow_requests || !record.is_slow() {
            return;
        }
        tracing::warn!(
            target: LIFECYCLE_TARGET,
            lifecycle = "slow",
            request_id = %context.request_id(),
            http.method = %meta.method,
            http.path = %meta.path,
            http.status_code = record.status_code(),
            duration_ms = record.duration_millis(),
            threshold_ms = u64::try_from(self.settings.slow_threshold.as_millis()).unwrap_or(u64::MAX),
            "slow request"
        );
    }

    fn record_metrics(
        &self,
        context: &CorrelationContext,
        meta: &RequestMeta,
        record: &RequestLifecycleRecord,
        failure_kind: Option<&str>,
    ) {
        let tags = MetricTagSet::new(&meta.path, meta.method.as_str(), record.status_code())
            .with_tenant(context.tenant_id().map(str::to_string));
        self.metrics.record_request(&tags, record.duration());
        if let Some(kind) = failure_kind {
            self.metrics.record_error(&tags, kind);
        }
    }
}

/// Fires the failure branch if the request future is dropped mid-flight.
struct InFlight<'r> {
    recorder: &'r LifecycleRecorder,
    context: &'r CorrelationContext,
    meta: &'r RequestMeta,
    pending: &'r PendingLifecycle,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let failure = if std::thread::panicking() {
            RequestFailure::application("HandlerPanic", "the request handler panicked")
        } else {
            RequestFailure::TransportClosed
        };
        let _ = self
            .recorder
            .finish_failure(self.context, self.meta, self.pending, &failure);
    }
}

/// Middleware running the rest of the chain under a [`LifecycleRecorder`].
///
/// Failures returned by later stages or the handler end here: the stage
/// always answers `Ok`, with the error envelope when processing failed. The
/// finished [`RequestLifecycleRecord`] is left in the context.
#[derive(Debug, Clone, Default)]
pub struct LifecycleMiddleware {
    recorder: LifecycleRecorder,
}

impl LifecycleMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(recorder: LifecycleRecorder) -> Self {
        Self { recorder }
    }

    /// Returns the recorder.
    #[must_use]
    pub fn recorder(&self) -> &LifecycleRecorder {
        &self.recorder
    }
}

impl Middleware for LifecycleMiddleware {
    fn name(&self) -> &'static str {
        "lifecycle"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let context = if let Some(context) = ctx.correlation() {
                Arc::clone(context)
            } else {
                let context = Arc::new(CorrelationContext::generated());
                ctx.set_correlation(Arc::clone(&context));
                context
            };

            let (request, meta) = self.recorder.prepare(request).await;
            let (response, record) = self
                .recorder
                .instrument(&context, &meta, next.run(ctx, request))
                .await;
            ctx.set_extension(record);
            Ok(response)
        })
    }
}
