//! # Waypoint Core
//!
//! Core types for the Waypoint request-observability pipeline.
//!
//! This crate provides the request-scoped data the rest of Waypoint works on:
//!
//! - [`CorrelationContext`] - Immutable bag of identifiers for one logical request
//! - [`RequestId`] - Client-supplied or generated (UUID v4) request identifier
//! - [`Diagnostics`] / [`DiagnosticKeys`] - The key/value map attached to every log line
//! - [`ContextPropagator`] - Installs a context as the ambient context of an async chain
//! - [`OutcomeBucket`] - Status-class bucket of an HTTP status code
//! - [`RequestLifecycleRecord`] - The finalized record of one request
//! - [`RequestFailure`] - Failure taxonomy handed to the classifier
//!
//! ## Ambient Context
//!
//! Identifiers travel with the request's future rather than with the worker
//! thread that happens to poll it:
//!
//! ```
//! use std::sync::Arc;
//! use waypoint_core::{ContextPropagator, CorrelationContext, propagation};
//!
//! # tokio_test::block_on(async {
//! let propagator = ContextPropagator::default();
//! let context = Arc::new(ContextPropagator::create(
//!     "req-1", "4bf92f3577b34da6a3ce929d0e0e4736", "00f067aa0ba902b7", None, None, None,
//! ));
//!
//! let seen = propagator
//!     .with_ambient_context(context, async {
//!         tokio::task::yield_now().await;
//!         propagation::current().map(|c| c.request_id().to_string())
//!     })
//!     .await;
//!
//! assert_eq!(seen.as_deref(), Some("req-1"));
//! assert!(propagation::current().is_none());
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/waypoint-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod diagnostics;
mod error;
mod outcome;
pub mod propagation;
mod record;

pub use context::{generate_span_id, generate_trace_id, CorrelationContext, RequestId, TraceSource};
pub use diagnostics::{DiagnosticKeys, Diagnostics};
pub use error::{short_type_name, FailureResult, RequestFailure};
pub use outcome::OutcomeBucket;
pub use propagation::ContextPropagator;
pub use record::{PendingLifecycle, RequestLifecycleRecord};
