//! Ordered middleware pipeline.
//!
//! A [`Pipeline`] runs its pre-handler stages, the handler, then its
//! post-handler stages, each wrapping the next. Stages added with
//! [`PipelineBuilder::with_observability`] always run first:
//!
//! ```text
//! Request → Correlation → Lifecycle → [custom stages] → Handler
//! ```
//!
//! A failure that no stage turns into a response (observability disabled, or
//! raised by a stage ahead of the lifecycle stage) is rendered by the
//! pipeline's own [`ErrorResponder`], so clients always get an envelope.

use crate::classify::ErrorClassifier;
use crate::context::MiddlewareContext;
use crate::envelope::ErrorEnvelope;
use crate::meta::{header_str, REQUEST_ID_HEADER};
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::responder::ErrorResponder;
use crate::stages::{CorrelationMiddleware, LifecycleMiddleware, LifecycleRecorder};
use crate::types::{HandlerResult, Request, Response};
use std::sync::Arc;
use waypoint_config::ObservabilityConfig;
use waypoint_core::ContextPropagator;
use waypoint_telemetry::{MetricsRecorder, TraceProvider};

/// A shared middleware stage.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The middleware pipeline.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use bytes::Bytes;
/// use http_body_util::Full;
/// use waypoint_config::ObservabilityConfig;
/// use waypoint_middleware::{MiddlewareContext, Pipeline};
/// use waypoint_telemetry::{InMemoryMetricsSink, MetricsRecorder, NoopTraceProvider};
///
/// # tokio_test::block_on(async {
/// let pipeline = Pipeline::builder()
///     .with_observability(
///         &ObservabilityConfig::default(),
///         MetricsRecorder::new(Arc::new(InMemoryMetricsSink::new())),
///         Arc::new(NoopTraceProvider),
///     )
///     .build();
/// assert_eq!(pipeline.stage_names(), vec!["correlation", "lifecycle"]);
///
/// let request = http::Request::builder()
///     .uri("/health")
///     .header("x-request-id", "abc-123")
///     .body(Full::new(Bytes::new()))
///     .unwrap();
///
/// let mut ctx = MiddlewareContext::new();
/// let response = pipeline
///     .process(&mut ctx, request, |_ctx, _req| {
///         Box::pin(async { Ok(http::Response::new(Full::new(Bytes::from("ok")))) })
///     })
///     .await;
///
/// assert_eq!(response.headers()["x-request-id"], "abc-123");
/// assert_eq!(ctx.lifecycle_record().map(|r| r.status_code()), Some(200));
/// # });
/// ```
pub struct Pipeline {
    pre_handler_stages: Vec<BoxedMiddleware>,

    post_handler_stages: Vec<BoxedMiddleware>,

    fallback: ErrorResponder,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Runs `request` through every stage and `handler`.
    pub async fn process<H>(
        &self,
        ctx: &mut MiddlewareContext,
        request: Request,
        handler: H,
    ) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, HandlerResult> + Send + 'static,
    {
        let path = request.uri().path().to_string();
        let request_id = header_str(request.headers(), REQUEST_ID_HEADER).map(str::to_string);

        let next = self.build_chain(handler);
        match next.run(ctx, request).await {
            Ok(response) => response,
            Err(failure) => {
                tracing::error!(
                    error = %failure,
                    http.path = %path,
                    "request failure reached the end of the pipeline"
                );
                let classification = self.fallback.classifier().classify(&failure);
                let envelope = ErrorEnvelope::build(
                    ctx.correlation().map(AsRef::as_ref),
                    &path,
                    &classification,
                    Some(ctx.elapsed()),
                )
                .with_request_id_hint(request_id);
                self.fallback.render(&envelope, &classification)
            }
        }
    }

    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, HandlerResult> + Send + 'a,
    {
        let mut next = Next::handler(handler);

        for middleware in self.post_handler_stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }

        for middleware in self.pre_handler_stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }

        next
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.pre_handler_stages
            .iter()
            .chain(&self.post_handler_stages)
            .map(|mw| mw.name())
            .collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.pre_handler_stages.len() + self.post_handler_stages.len()
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    observability: Vec<BoxedMiddleware>,

    pre_handler_stages: Vec<BoxedMiddleware>,

    post_handler_stages: Vec<BoxedMiddleware>,

    fallback: ErrorResponder,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            observability: Vec::new(),
            pre_handler_stages: Vec::new(),
            post_handler_stages: Vec::new(),
            fallback: ErrorResponder::default(),
        }
    }

    /// Installs the correlation and lifecycle stages configured by `config`.
    ///
    /// With `config.enabled` off no stage is installed; failures are then
    /// still answered with an error envelope by the pipeline itself.
    #[must_use]
    pub fn with_observability(
        mut self,
        config: &ObservabilityConfig,
        metrics: MetricsRecorder,
        trace_provider: Arc<dyn TraceProvider>,
    ) -> Self {
        self.fallback = ErrorResponder::new(ErrorClassifier::from_config(&config.error));
        self.observability.clear();

        if !config.enabled {
            tracing::debug!("observability disabled; requests pass straight through");
            return self;
        }

        let propagator = ContextPropagator::new(config.diagnostic_keys.clone());
        let recorder = LifecycleRecorder::from_config(config)
            .with_metrics(metrics.with_enabled(config.metrics.enabled))
            .with_trace_provider(Arc::clone(&trace_provider));

        self.observability
            .push(Arc::new(CorrelationMiddleware::new(propagator, trace_provider)));
        self.observability
            .push(Arc::new(LifecycleMiddleware::new(recorder)));
        self
    }

    /// Appends a stage that runs before the handler.
    #[must_use]
    pub fn add_pre_handler_stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.pre_handler_stages.push(Arc::new(middleware));
        self
    }

    /// Appends a stage that runs after the pre-handler stages.
    #[must_use]
    pub fn add_post_handler_stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.post_handler_stages.push(Arc::new(middleware));
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        let mut pre_handler_stages = self.observability;
        pre_handler_stages.extend(self.pre_handler_stages);
        Pipeline {
            pre_handler_stages,
            post_handler_stages: self.post_handler_stages,
            fallback: self.fallback,
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
