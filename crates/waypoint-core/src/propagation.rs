//! Ambient context propagation.
//!
//! Each logical request owns one ambient slot, held in a tokio task-local.
//! [`ContextPropagator::with_ambient_context`] wraps the request's future so
//! that the slot is installed on every poll and removed again whenever the
//! future suspends. The worker thread that polls the next continuation
//! therefore never sees identifiers left behind by another request.
//!
//! Work handed to a different task loses task-locals; use [`propagate`] or
//! [`spawn_propagated`] to carry the context (and the current tracing span and
//! dispatcher) across that hop.
//!
//! Lookups outside any scope return `None`, so code that logs without a
//! request in flight keeps working, just without enrichment.

use crate::context::{CorrelationContext, RequestId};
use crate::diagnostics::{DiagnosticKeys, Diagnostics};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::Instrument;

tokio::task_local! {
    static AMBIENT: Ambient;
}

#[derive(Debug, Clone)]
struct Ambient {
    context: Arc<CorrelationContext>,
    diagnostics: Arc<Diagnostics>,
    keys: Arc<DiagnosticKeys>,
}

/// Creates correlation contexts and installs them as ambient state.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use waypoint_core::{ContextPropagator, DiagnosticKeys, propagation};
///
/// # tokio_test::block_on(async {
/// let propagator = ContextPropagator::new(DiagnosticKeys::default());
/// let ctx = Arc::new(ContextPropagator::create("r-7", "t", "s", None, None, Some("acme".into())));
///
/// propagator
///     .with_ambient_context(ctx, async {
///         let diagnostics = propagation::current_diagnostics().unwrap();
///         assert_eq!(diagnostics.get("tenantId"), Some("acme"));
///     })
///     .await;
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct ContextPropagator {
    keys: Arc<DiagnosticKeys>,
}

impl ContextPropagator {
    /// Creates a propagator publishing identifiers under `keys`.
    #[must_use]
    pub fn new(keys: DiagnosticKeys) -> Self {
        Self {
            keys: Arc::new(keys),
        }
    }

    /// Returns the configured diagnostic key names.
    #[must_use]
    pub fn keys(&self) -> &DiagnosticKeys {
        &self.keys
    }

    /// Builds a correlation context. No side effects.
    #[must_use]
    pub fn create(
        request_id: impl Into<RequestId>,
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        user_id: Option<String>,
        session_id: Option<String>,
        tenant_id: Option<String>,
    ) -> CorrelationContext {
        CorrelationContext::new(request_id.into(), trace_id, span_id)
            .with_user_id(user_id)
            .with_session_id(session_id)
            .with_tenant_id(tenant_id)
    }

    /// Returns the diagnostic map for `context`.
    #[must_use]
    pub fn diagnostics_for(&self, context: &CorrelationContext) -> Diagnostics {
        Diagnostics::from_context(context, &self.keys)
    }

    /// Runs `work` with `context` as its ambient context.
    pub fn with_ambient_context<F>(
        &self,
        context: Arc<CorrelationContext>,
        work: F,
    ) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        let diagnostics = self.diagnostics_for(&context);
        self.with_ambient_diagnostics(context, diagnostics, work)
    }

    /// Runs `work` with `context` and a caller-built diagnostic map.
    ///
    /// Used when the map should carry more than the context's identifiers,
    /// such as the request path and method.
    pub fn with_ambient_diagnostics<F>(
        &self,
        context: Arc<CorrelationContext>,
        diagnostics: Diagnostics,
        work: F,
    ) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        let span = tracing::info_span!(
            "request",
            request_id = %context.request_id(),
            trace_id = %context.trace_id(),
            span_id = %context.span_id(),
        );
        let ambient = Ambient {
            context,
            diagnostics: Arc::new(diagnostics),
            keys: Arc::clone(&self.keys),
        };
        AMBIENT.scope(ambient, work).instrument(span)
    }
}

/// Returns the ambient correlation context, if one is installed.
pub fn current() -> Option<Arc<CorrelationContext>> {
    AMBIENT.try_with(|a| Arc::clone(&a.context)).ok()
}

/// Returns the ambient diagnostic map, if one is installed.
pub fn current_diagnostics() -> Option<Arc<Diagnostics>> {
    AMBIENT.try_with(|a| Arc::clone(&a.diagnostics)).ok()
}

/// Runs `work` with extra diagnostic entries layered over the ambient map.
///
/// The ambient map is captured when this function is called, so call it
/// from inside the request's scope. Existing keys keep their values. The
/// enclosing map is untouched and is back in effect as soon as `work`
/// suspends or finishes. Without an ambient context, `work` runs unchanged.
pub fn with_enrichment<I, K, V, F>(extra: I, work: F) -> impl Future<Output = F::Output>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
    F: Future,
{
    let enriched = AMBIENT
        .try_with(|a| Ambient {
            context: Arc::clone(&a.context),
            diagnostics: Arc::new(a.diagnostics.derive(extra)),
            keys: Arc::clone(&a.keys),
        })
        .ok();

    async move {
        match enriched {
            Some(ambient) => AMBIENT.scope(ambient, work).await,
            None => work.await,
        }
    }
}

/// Runs `work` as a named operation under the configured `operation` key.
pub fn with_operation<F>(name: impl Into<String>, work: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let key = AMBIENT
        .try_with(|a| a.keys.operation.clone())
        .unwrap_or_else(|_| DiagnosticKeys::default().operation);
    with_enrichment([(key, name.into())], work)
}

/// Attaches the caller's ambient context, span and dispatcher to `work`.
///
/// The returned future can be moved to another task or executor and will
/// still log with the caller's identifiers.
pub fn propagate<F>(work: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let ambient = AMBIENT.try_with(Clone::clone).ok();
    let span = tracing::Span::current();
    let dispatch = tracing::dispatcher::get_default(Clone::clone);

    async move {
        match ambient {
            Some(ambient) => AMBIENT.scope(ambient, work).await,
            None => work.await,
        }
    }
    .instrument(span)
    .with_subscriber(dispatch)
}

/// Spawns `work` on the tokio runtime, carrying the ambient context along.
pub fn spawn_propagated<F>(work: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(propagate(work))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio_test::{assert_pending, assert_ready};

    fn context(id: &str) -> Arc<CorrelationContext> {
        Arc::new(ContextPropagator::create(
            id,
            format!("trace-{id}"),
            format!("span-{id}"),
            None,
            None,
            None,
        ))
    }

    fn current_request_id() -> Option<String> {
        current().map(|c| c.request_id().to_string())
    }

    #[test]
    fn test_create_is_pure() {
        let a = ContextPropagator::create("r", "t", "s", Some("u".into()), None, None);
        let b = ContextPropagator::create("r", "t", "s", Some("u".into()), None, None);
        assert_eq!(a, b);
        assert!(current().is_none());
    }

    #[test]
    fn test_lookup_outside_scope_degrades() {
        assert!(current().is_none());
        assert!(current_diagnostics().is_none());
    }

    #[test]
    fn test_scope_is_removed_while_suspended() {
        let propagator = ContextPropagator::default();
        let (tx, rx) = oneshot::channel::<()>();

        let mut task = tokio_test::task::spawn(propagator.with_ambient_context(
            context("held"),
            async move {
                let before = current_request_id();
                let _ = rx.await;
                (before, current_request_id())
            },
        ));

        assert_pending!(task.poll());
        assert!(current().is_none());

        tx.send(()).unwrap();
        let (before, after) = assert_ready!(task.poll());
        assert_eq!(before.as_deref(), Some("held"));
        assert_eq!(after.as_deref(), Some("held"));
        assert!(current().is_none());
    }

    #[test]
    fn test_enrichment_restores_outer_map() {
        let propagator = ContextPropagator::default();
        let (tx, rx) = oneshot::channel::<()>();

        let mut task = tokio_test::task::spawn(propagator.with_ambient_context(
            context("outer"),
            async move {
                let inner = with_operation("charge", async move {
                    let _ = rx.await;
                    current_diagnostics().and_then(|d| d.get("operation").map(String::from))
                })
                .await;
                let outer = current_diagnostics().and_then(|d| d.get("operation").map(String::from));
                (inner, outer)
            },
        ));

        assert_pending!(task.poll());
        tx.send(()).unwrap();
        let (inner, outer) = assert_ready!(task.poll());
        assert_eq!(inner.as_deref(), Some("charge"));
        assert!(outer.is_none());
    }

    #[test]
    fn test_enrichment_keeps_existing_keys() {
        let propagator = ContextPropagator::default();
        let seen = tokio_test::block_on(propagator.with_ambient_context(context("keep"), async {
            with_enrichment([("requestId", "other"), ("step", "2")], async {
                current_diagnostics().map(|d| {
                    (
                        d.get("requestId").map(String::from),
                        d.get("step").map(String::from),
                    )
                })
            })
            .await
        }));
        assert_eq!(
            seen,
            Some((Some("keep".to_string()), Some("2".to_string())))
        );
    }

    #[test]
    fn test_enrichment_without_scope_runs_work() {
        let value = tokio_test::block_on(with_enrichment([("k", "v")], async { 42 }));
        assert_eq!(value, 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_interleaved_requests_never_share_identifiers() {
        let propagator = ContextPropagator::default();
        let mut handles = Vec::new();

        for i in 0..16 {
            let id = format!("req-{i}");
            let work = propagator.with_ambient_context(context(&id), {
                let id = id.clone();
                async move {
                    for step in 0..50u64 {
                        if step % 3 == 0 {
                            tokio::time::sleep(Duration::from_micros(50)).await;
                        } else {
                            tokio::task::yield_now().await;
                        }
                        assert_eq!(current_request_id().as_deref(), Some(id.as_str()));
                    }
                }
            });
            handles.push(tokio::spawn(work));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawn_propagated_carries_context() {
        let propagator = ContextPropagator::default();
        let seen = propagator
            .with_ambient_context(context("hop"), async {
                spawn_propagated(async { current_request_id() }).await.unwrap()
            })
            .await;
        assert_eq!(seen.as_deref(), Some("hop"));
    }

    #[tokio::test]
    async fn test_plain_spawn_does_not_inherit() {
        let propagator = ContextPropagator::default();
        let seen = propagator
            .with_ambient_context(context("lost"), async {
                tokio::spawn(async { current_request_id() }).await.unwrap()
            })
            .await;
        assert!(seen.is_none());
    }
}
