//! In-memory log capture.
//!
//! [`LogCapture`] is a `tracing_subscriber` layer that keeps every event,
//! together with the ambient diagnostic map active when it was emitted.
//! Install it with [`LogCapture::dispatch`] and
//! `tracing::instrument::WithSubscriber` to assert on log output.

use crate::logging::{JsonFields, LIFECYCLE_TARGET};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;
use waypoint_core::{propagation, Diagnostics};

/// One captured log event.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    /// Event level.
    pub level: Level,
    /// Event target.
    pub target: String,
    /// Formatted message.
    pub message: String,
    /// Structured fields other than the message.
    pub fields: Map<String, Value>,
    /// Ambient diagnostics at emission time.
    pub diagnostics: Option<Arc<Diagnostics>>,
}

impl CapturedEvent {
    /// Returns field `name` rendered as text.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Returns diagnostic entry `key`.
    #[must_use]
    pub fn diagnostic(&self, key: &str) -> Option<&str> {
        self.diagnostics.as_deref().and_then(|d| d.get(key))
    }
}

/// Layer that records events in memory. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl LogCapture {
    /// Creates an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a dispatcher that feeds this capture.
    #[must_use]
    pub fn dispatch(&self) -> tracing::Dispatch {
        tracing::Dispatch::new(tracing_subscriber::registry().with(self.clone()))
    }

    /// Returns a snapshot of all captured events.
    #[must_use]
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    /// Returns events emitted with `target`.
    #[must_use]
    pub fn events_for_target(&self, target: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.target == target)
            .cloned()
            .collect()
    }

    /// Returns request lifecycle events.
    #[must_use]
    pub fn lifecycle_events(&self) -> Vec<CapturedEvent> {
        self.events_for_target(LIFECYCLE_TARGET)
    }

    /// Number of captured events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drops all captured events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut fields = Map::new();
        event.record(&mut JsonFields::new(&mut fields));
        let message = match fields.remove("message") {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        self.events.lock().push(CapturedEvent {
            level: *meta.level(),
            target: meta.target().to_string(),
            message,
            fields,
            diagnostics: propagation::current_diagnostics(),
        });
    }
}
