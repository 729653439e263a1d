//! # Waypoint
//!
//! Request observability for HTTP services: every request gets correlation
//! identifiers that follow it across async hops, start and completion logs,
//! a consistent JSON error envelope, and tagged metrics.
//!
//! ## Crates
//!
//! | Crate                | Contents                                           |
//! |----------------------|----------------------------------------------------|
//! | `waypoint-core`      | Correlation context, failures, ambient propagation |
//! | `waypoint-telemetry` | Logging, metrics, trace lookup, payload masking    |
//! | `waypoint-config`    | Layered configuration                              |
//! | `waypoint-middleware`| Pipeline stages and error envelopes                |
//!
//! ## Example
//!
//! ```rust,ignore
//! use waypoint::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), waypoint::SetupError> {
//!     let config = ConfigLoader::new()
//!         .with_defaults()
//!         .with_optional_file("waypoint.toml")?
//!         .with_env_prefix("WAYPOINT")
//!         .load()?;
//!
//!     let observability = Observability::new(config)?;
//!     let _telemetry = observability.init_telemetry()?;
//!     let pipeline = observability.pipeline();
//!     // hand `pipeline` to the server loop
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/waypoint/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::sync::Arc;
use thiserror::Error;
use waypoint_config::{ConfigError, ObservabilityConfig};
use waypoint_middleware::Pipeline;
use waypoint_telemetry::{
    init_telemetry, MetricsRecorder, OtelTraceProvider, Telemetry, TelemetryError, TraceProvider,
};

pub use waypoint_config as config;
pub use waypoint_core as core;
pub use waypoint_middleware as middleware;
pub use waypoint_telemetry as telemetry;

/// Errors raised while setting up observability.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Logging or the metrics exporter failed to start.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

/// Validated configuration plus the collaborators the pipeline reports to.
#[derive(Debug, Clone)]
pub struct Observability {
    config: ObservabilityConfig,
    metrics: MetricsRecorder,
    trace_provider: Arc<dyn TraceProvider>,
}

impl Observability {
    /// Validates `config`. Metrics go to the global recorder and trace IDs
    /// come from the active OpenTelemetry span.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Config`] if `config` fails validation.
    pub fn new(config: ObservabilityConfig) -> Result<Self, SetupError> {
        config.validate()?;
        Ok(Self {
            config,
            metrics: MetricsRecorder::default(),
            trace_provider: Arc::new(OtelTraceProvider),
        })
    }

    /// Replaces the metrics recorder.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replaces the trace provider.
    #[must_use]
    pub fn with_trace_provider(mut self, provider: Arc<dyn TraceProvider>) -> Self {
        self.trace_provider = provider;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ObservabilityConfig {
        &self.config
    }

    /// Installs the global subscriber and the Prometheus exporter.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Telemetry`] if either fails to start.
    pub fn init_telemetry(&self) -> Result<Telemetry, SetupError> {
        Ok(init_telemetry(&self.config.telemetry_config())?)
    }

    /// Builds a pipeline with the correlation and lifecycle stages.
    #[must_use]
    pub fn pipeline(&self) -> Pipeline {
        self.pipeline_builder().build()
    }

    /// Returns a builder preloaded with the observability stages, for adding
    /// custom stages.
    #[must_use]
    pub fn pipeline_builder(&self) -> waypoint_middleware::PipelineBuilder {
        tracing::debug!(
            enabled = self.config.enabled,
            sample_rate = self.config.sample_rate,
            "building observability pipeline"
        );
        Pipeline::builder().with_observability(
            &self.config,
            self.metrics.clone(),
            Arc::clone(&self.trace_provider),
        )
    }
}

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use waypoint::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Observability, SetupError};

    pub use waypoint_core::propagation::{spawn_propagated, with_enrichment, with_operation};
    pub use waypoint_core::{CorrelationContext, RequestFailure, RequestId};

    pub use waypoint_config::{ConfigLoader, ObservabilityConfig};

    pub use waypoint_middleware::{
        ErrorResponder, HandlerResult, Middleware, MiddlewareContext, Next, Pipeline, Request,
        Response,
    };

    pub use waypoint_telemetry::{MetricsRecorder, TraceProvider};
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Full;
    use waypoint_telemetry::{InMemoryMetricsSink, NoopTraceProvider};

    #[test]
    fn test_invalid_config_rejected() {
        let config = ObservabilityConfig {
            sample_rate: 2.0,
            ..ObservabilityConfig::default()
        };
        assert!(matches!(Observability::new(config), Err(SetupError::Config(_))));
    }

    #[test]
    fn test_pipeline_has_observability_stages() {
        let observability = Observability::new(ObservabilityConfig::production()).unwrap();
        assert_eq!(observability.pipeline().stage_names(), vec!["correlation", "lifecycle"]);
    }

    #[tokio::test]
    async fn test_pipeline_reports_to_configured_sink() {
        let sink = InMemoryMetricsSink::new();
        let observability = Observability::new(ObservabilityConfig::default())
            .unwrap()
            .with_metrics(MetricsRecorder::new(Arc::new(sink.clone())))
            .with_trace_provider(Arc::new(NoopTraceProvider));

        let request = http::Request::builder()
            .uri("/ping")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let mut ctx = waypoint_middleware::MiddlewareContext::new();
        let response = observability
            .pipeline()
            .process(&mut ctx, request, |_ctx, _req| {
                Box::pin(async { Ok(http::Response::new(Full::new(Bytes::new()))) })
            })
            .await;

        assert!(response.status().is_success());
        assert_eq!(sink.counter_total("http_server_requests_total", &[("path", "/ping")]), 1);
    }
}
