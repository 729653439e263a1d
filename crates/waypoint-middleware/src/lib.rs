//! # Waypoint Middleware
//!
//! Request observability for HTTP services, as an ordered middleware
//! pipeline.
//!
//! ## Pipeline Stages
//!
//! ```text
//! Request → Correlation → Lifecycle → [custom stages] → Handler
//!                             ↓                            ↓
//! Response ←──── error envelope / response headers ←───────┘
//! ```
//!
//! | Stage       | Purpose                                                  |
//! |-------------|----------------------------------------------------------|
//! | Correlation | Assign request/trace IDs, install the ambient context    |
//! | Lifecycle   | Start/completion/slow logs, error envelopes, metrics     |
//!
//! Every request gets a [`CorrelationContext`](waypoint_core::CorrelationContext)
//! that stays reachable from any task working on its behalf, exactly one
//! terminal lifecycle event (completed or failed), and on failure exactly
//! one JSON error envelope:
//!
//! ```json
//! {"timestamp":"2026-03-01T12:00:00.000","path":"/accounts/42","status":400,
//!  "error":"Bad Request","message":"invalid amount","requestId":"abc-123",
//!  "traceId":null,"spanId":null,"processingTimeMs":3}
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use waypoint_config::ObservabilityConfig;
//! use waypoint_middleware::Pipeline;
//! use waypoint_telemetry::{MetricsRecorder, NoopTraceProvider};
//!
//! let pipeline = Pipeline::builder()
//!     .with_observability(
//!         &ObservabilityConfig::production(),
//!         MetricsRecorder::default(),
//!         Arc::new(NoopTraceProvider),
//!     )
//!     .build();
//!
//! assert_eq!(pipeline.stage_names(), vec!["correlation", "lifecycle"]);
//! ```

#![doc(html_root_url = "https://docs.rs/waypoint-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod classify;
pub mod context;
pub mod envelope;
pub mod meta;
pub mod middleware;
pub mod pipeline;
pub mod responder;
pub mod stages;
pub mod types;

pub use classify::{Classification, ErrorClassifier};
pub use context::MiddlewareContext;
pub use envelope::{EnvelopeRenderer, ErrorEnvelope, FlatJsonRenderer};
pub use meta::{RemoteAddr, RequestMeta};
pub use middleware::{BoxFuture, FnMiddleware, Middleware, Next};
pub use pipeline::{BoxedMiddleware, Pipeline, PipelineBuilder};
pub use responder::ErrorResponder;
pub use stages::{CorrelationMiddleware, LifecycleMiddleware, LifecycleRecorder};
pub use types::{HandlerResult, Request, Response};
