//! Observability stages.
//!
//! [`PipelineBuilder::with_observability`](crate::PipelineBuilder::with_observability)
//! installs them ahead of any other stage:
//!
//! 1. [`correlation`] - assign identifiers, install the ambient context
//! 2. [`lifecycle`] - lifecycle logs, failure classification, metrics

pub mod correlation;
pub mod lifecycle;

pub use correlation::CorrelationMiddleware;
pub use lifecycle::{LifecycleMiddleware, LifecycleRecorder};
