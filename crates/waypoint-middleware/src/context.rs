//! Per-request pipeline state.
//!
//! The [`MiddlewareContext`] is created once per request and handed by
//! mutable reference to every stage. The correlation stage stores the
//! request's [`CorrelationContext`] here; the lifecycle stage leaves the
//! finished [`RequestLifecycleRecord`] behind as an extension.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use waypoint_core::{CorrelationContext, RequestLifecycleRecord};

/// Mutable state shared by the stages of one request.
#[derive(Debug)]
pub struct MiddlewareContext {
    correlation: Option<Arc<CorrelationContext>>,

    started_at: Instant,

    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MiddlewareContext {
    /// Creates an empty context and starts its clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            correlation: None,
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Returns the request's correlation context, once assigned.
    #[must_use]
    pub fn correlation(&self) -> Option<&Arc<CorrelationContext>> {
        self.correlation.as_ref()
    }

    /// Assigns the correlation context.
    pub fn set_correlation(&mut self, context: Arc<CorrelationContext>) {
        self.correlation = Some(context);
    }

    /// Returns the request ID, once assigned.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.correlation.as_deref().map(|c| c.request_id().as_str())
    }

    /// When the pipeline started processing this request.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Time spent in the pipeline so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns the lifecycle record, once the request has finished.
    #[must_use]
    pub fn lifecycle_record(&self) -> Option<&RequestLifecycleRecord> {
        self.get_extension::<RequestLifecycleRecord>()
    }

    /// Stores a typed extension, replacing any previous value of that type.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns the extension of type `T`.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns the extension of type `T`.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Returns true if an extension of type `T` is stored.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }
}

impl Default for MiddlewareContext {
    fn default() -> Self {
        Self::new()
    }
}
