//! The middleware trait and chain plumbing.
//!
//! Every stage implements [`Middleware`]. A stage receives the request and a
//! [`Next`] it may call to continue the chain; whatever it returns flows back
//! to the stage before it.
//!
//! # Example
//!
//! ```
//! use waypoint_middleware::middleware::{BoxFuture, Middleware, Next};
//! use waypoint_middleware::{HandlerResult, MiddlewareContext, Request};
//!
//! struct Tag;
//!
//! impl Middleware for Tag {
//!     fn name(&self) -> &'static str {
//!         "tag"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut MiddlewareContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, HandlerResult> {
//!         Box::pin(async move {
//!             let mut response = next.run(ctx, request).await?;
//!             response
//!                 .headers_mut()
//!                 .insert("x-tagged", http::HeaderValue::from_static("1"));
//!             Ok(response)
//!         })
//!     }
//! }
//! ```

use crate::context::MiddlewareContext;
use crate::types::{HandlerResult, Request};
use std::future::Future;
use std::pin::Pin;

/// A boxed future that is `Send` and has a lifetime.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A pipeline stage.
pub trait Middleware: Send + Sync + 'static {
    /// Stage name, used in pipeline introspection and logs.
    fn name(&self) -> &'static str;

    /// Processes a request.
    ///
    /// Call `next.run(ctx, request)` to continue the chain. Returning without
    /// calling it short-circuits every later stage and the handler.
    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult>;
}

/// The remainder of the chain.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

type TerminalHandler<'a> =
    Box<dyn FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, HandlerResult> + Send + 'a>;

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Handler(TerminalHandler<'a>),
}

impl<'a> Next<'a> {
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    pub(crate) fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, HandlerResult> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Runs the rest of the chain.
    pub async fn run(self, ctx: &mut MiddlewareContext, request: Request) -> HandlerResult {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, request, *next).await,
            NextInner::Handler(handler) => handler(ctx, request).await,
        }
    }
}

/// Adapts a closure into a [`Middleware`].
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut MiddlewareContext, Request, Next<'a>) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    /// Wraps `func` under `name`.
    pub fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut MiddlewareContext, Request, Next<'a>) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        (self.func)(ctx, request, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Request as HttpRequest, Response as HttpResponse, StatusCode};
    use http_body_util::Full;
    use waypoint_core::RequestFailure;

    #[derive(Debug, Clone, PartialEq)]
    struct Visited(Vec<&'static str>);

    struct RecordingMiddleware {
        name: &'static str,
    }

    impl Middleware for RecordingMiddleware {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, HandlerResult> {
            Box::pin(async move {
                let mut visited = ctx
                    .remove_extension::<Visited>()
                    .unwrap_or(Visited(Vec::new()));
                visited.0.push(self.name);
                ctx.set_extension(visited);
                next.run(ctx, request).await
            })
        }
    }

    fn request() -> Request {
        HttpRequest::builder()
            .uri("/test")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn ok_handler<'a>() -> Next<'a> {
        Next::handler(|_ctx, _req| {
            Box::pin(async {
                Ok(HttpResponse::builder()
                    .status(StatusCode::OK)
                    .body(Full::new(Bytes::from("OK")))
                    .unwrap())
            })
        })
    }

    #[tokio::test]
    async fn test_next_handler() {
        let mut ctx = MiddlewareContext::new();
        let response = ok_handler().run(&mut ctx, request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_middleware_chain_order() {
        let first = RecordingMiddleware { name: "first" };
        let second = RecordingMiddleware { name: "second" };
        let mut ctx = MiddlewareContext::new();

        let next = Next::new(&first, Next::new(&second, ok_handler()));
        let response = next.run(&mut ctx, request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            ctx.get_extension::<Visited>(),
            Some(&Visited(vec!["first", "second"]))
        );
    }

    #[tokio::test]
    async fn test_failure_flows_back_unchanged() {
        let stage = RecordingMiddleware { name: "outer" };
        let mut ctx = MiddlewareContext::new();
        let failing = Next::handler(|_ctx, _req| {
            Box::pin(async { Err(RequestFailure::validation("bad input")) })
        });

        let result = Next::new(&stage, failing).run(&mut ctx, request()).await;
        let err = result.unwrap_err();
        assert_eq!(err.message().as_deref(), Some("bad input"));
    }

    #[tokio::test]
    async fn test_fn_middleware() {
        let stage = FnMiddleware::new("header", |ctx, request, next| {
            Box::pin(async move {
                let mut response = next.run(ctx, request).await?;
                response
                    .headers_mut()
                    .insert("x-stage", http::HeaderValue::from_static("header"));
                Ok(response)
            })
        });
        assert_eq!(stage.name(), "header");

        let mut ctx = MiddlewareContext::new();
        let response = Next::new(&stage, ok_handler())
            .run(&mut ctx, request())
            .await
            .unwrap();
        assert_eq!(response.headers()["x-stage"], "header");
    }
}
