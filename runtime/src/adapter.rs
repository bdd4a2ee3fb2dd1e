//! Handler adapter: native callback in, single outcome out.
//!
//! [`adapt`] turns a typed, async handler into a [`NativeHandler`]. Each
//! native call goes through the same fixed sequence:
//!
//! 1. build a fresh [`RequestContext`] from `(request, response, next)`
//! 2. bind it in the context registry
//! 3. run the handler to settlement, catching panics; the result becomes an
//!    [`Outcome`]
//! 4. hand the outcome to the route's [`ExitPolicy`], exactly once
//! 5. unbind the context
//!
//! Nothing the handler does, including panicking, escapes the adapter.
//! There is no timeout: a handler that never settles keeps its request open.

use crate::context::{self, RequestContext};
use crate::native::{NativeHandler, Next, Request, Response};
use composable_http_core::outcome::outcome_label;
use composable_http_core::{BoxError, ContextError, Failure, HttpError, Outcome, Params, PathParams};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

// ============================================================================
// Handler context
// ============================================================================

/// Everything a handler needs, passed explicitly: the request context and
/// the capability set (`Env`) the pipeline was built with.
pub struct HandlerContext<Env> {
    context: RequestContext,
    env: Arc<Env>,
}

impl<Env> Clone for HandlerContext<Env> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            env: Arc::clone(&self.env),
        }
    }
}

impl<Env> HandlerContext<Env> {
    /// Bundle a request context with capabilities.
    #[must_use]
    pub const fn new(context: RequestContext, env: Arc<Env>) -> Self {
        Self { context, env }
    }

    /// Capability set.
    #[must_use]
    pub fn env(&self) -> &Env {
        &self.env
    }

    /// The request context (the same one the registry has bound).
    #[must_use]
    pub const fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Inbound request.
    #[must_use]
    pub const fn request(&self) -> &Request {
        self.context.request()
    }

    /// Outbound response.
    #[must_use]
    pub const fn response(&self) -> &Response {
        self.context.response()
    }

    /// Continuation.
    #[must_use]
    pub const fn next(&self) -> &Next {
        self.context.next()
    }

    /// Matched path parameters.
    #[must_use]
    pub const fn params(&self) -> &Params {
        self.context.params()
    }

    /// Typed path parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::MissingParam`] if a name expected by `P` was not bound.
    pub fn params_as<P: PathParams>(&self) -> Result<P, ContextError> {
        self.context.params_as()
    }
}

impl<Env> std::fmt::Debug for HandlerContext<Env> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Handler
// ============================================================================

/// A per-request computation: runs once per matching call.
///
/// Implemented for every `Fn(HandlerContext<Env>) -> impl Future<Output = Result<(), E>>`.
pub trait Handler<Env, E>: Send + Sync + 'static {
    /// Start the computation for one request.
    fn call(&self, cx: HandlerContext<Env>) -> BoxFuture<'static, Result<(), E>>;
}

impl<Env, E, F, Fut> Handler<Env, E> for F
where
    F: Fn(HandlerContext<Env>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    fn call(&self, cx: HandlerContext<Env>) -> BoxFuture<'static, Result<(), E>> {
        Box::pin(self(cx))
    }
}

/// A handler that also receives typed path parameters.
///
/// Used with typed route registration, which checks at build time that the
/// pattern declares exactly `P::NAMES`.
pub(crate) struct Typed<P, H> {
    handler: H,
    _params: std::marker::PhantomData<fn() -> P>,
}

impl<P, H> Typed<P, H> {
    pub(crate) const fn new(handler: H) -> Self {
        Self {
            handler,
            _params: std::marker::PhantomData,
        }
    }
}

impl<Env, E, P, H, Fut> Handler<Env, BoxError> for Typed<P, H>
where
    Env: Send + Sync + 'static,
    P: PathParams,
    E: Into<BoxError> + 'static,
    H: Fn(HandlerContext<Env>, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    fn call(&self, cx: HandlerContext<Env>) -> BoxFuture<'static, Result<(), BoxError>> {
        match cx.params_as::<P>() {
            Ok(params) => (self.handler)(cx, params)
                .map(|result| result.map_err(Into::into))
                .boxed(),
            Err(err) => futures::future::ready(Err(err.into())).boxed(),
        }
    }
}

// ============================================================================
// Exit policies
// ============================================================================

/// Decides what happens to a settled outcome.
///
/// Called synchronously, exactly once per request, while the request
/// context is still bound. Implemented for closures
/// `Fn(Outcome<E>, &RequestContext)`.
pub trait ExitPolicy<E>: Send + Sync + 'static {
    /// Consume the outcome of one request.
    fn on_exit(&self, outcome: Outcome<E>, context: &RequestContext);
}

impl<E, F> ExitPolicy<E> for F
where
    F: Fn(Outcome<E>, &RequestContext) + Send + Sync + 'static,
{
    fn on_exit(&self, outcome: Outcome<E>, context: &RequestContext) {
        self(outcome, context);
    }
}

/// Default policy: failures go to the native error chain, success does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardErrors;

impl<E: Into<BoxError>> ExitPolicy<E> for ForwardErrors {
    fn on_exit(&self, outcome: Outcome<E>, context: &RequestContext) {
        if let Err(failure) = outcome {
            context.next().fail(into_box_error(failure));
        }
    }
}

/// Ignore both branches; the handler manages its own response entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl<E> ExitPolicy<E> for Silent {
    fn on_exit(&self, _outcome: Outcome<E>, _context: &RequestContext) {}
}

/// Log every outcome, then delegate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Traced<P = ForwardErrors> {
    inner: P,
}

impl<P> Traced<P> {
    /// Log, then apply `inner`.
    #[must_use]
    pub const fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<E, P> ExitPolicy<E> for Traced<P>
where
    E: Display,
    P: ExitPolicy<E>,
{
    fn on_exit(&self, outcome: Outcome<E>, context: &RequestContext) {
        let request = context.request();
        match &outcome {
            Ok(()) => tracing::debug!(
                method = %request.method(),
                path = %request.original_path(),
                outcome = "ok",
                "handler completed"
            ),
            Err(failure) => tracing::warn!(
                method = %request.method(),
                path = %request.original_path(),
                outcome = failure.label(),
                error = %failure,
                "handler failed"
            ),
        }
        self.inner.on_exit(outcome, context);
    }
}

/// Erase a failure for the continuation, keeping handler errors as-is so the
/// error chain can downcast them.
#[must_use]
pub fn into_box_error<E: Into<BoxError>>(failure: Failure<E>) -> BoxError {
    match failure {
        Failure::Handler(e) => e.into(),
        Failure::Panicked(message) => Box::new(Failure::<Infallible>::Panicked(message)),
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Build the native callback for one effect route or middleware.
///
/// `route` is used for logging only.
pub fn adapt<Env, E, H, X>(route: Arc<str>, env: Arc<Env>, handler: Arc<H>, policy: Arc<X>) -> NativeHandler
where
    Env: Send + Sync + 'static,
    E: Send + 'static,
    H: Handler<Env, E>,
    X: ExitPolicy<E>,
{
    Arc::new(move |request, response, next| {
        let context = RequestContext::new(request, response, next);
        let cx = HandlerContext::new(context.clone(), Arc::clone(&env));
        let handler = Arc::clone(&handler);
        let policy = Arc::clone(&policy);
        let route = Arc::clone(&route);

        Box::pin(context::bind(context.clone(), async move {
            tracing::trace!(route = %route, "context bound; executing handler");
            let settled = AssertUnwindSafe(async move { handler.call(cx).await })
                .catch_unwind()
                .await;

            let outcome: Outcome<E> = match settled {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(Failure::Handler(e)),
                Err(payload) => Err(Failure::from_panic(payload.as_ref())),
            };
            let label = outcome_label(&outcome);
            metrics::counter!("http.handler.outcome", "outcome" => label).increment(1);
            tracing::trace!(route = %route, outcome = label, "outcome produced; dispatching exit");

            dispatch_exit(&*policy, outcome, &context, &route);
        }))
    })
}

fn dispatch_exit<E, X: ExitPolicy<E> + ?Sized>(
    policy: &X,
    outcome: Outcome<E>,
    context: &RequestContext,
    route: &str,
) {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| policy.on_exit(outcome, context)));
    if let Err(payload) = result {
        let failure = Failure::<Infallible>::from_panic(payload.as_ref());
        tracing::error!(route = %route, error = %failure, "exit policy panicked");
        if !context.next().is_signalled() && !context.response().is_sent() {
            context
                .next()
                .fail(HttpError::internal("Internal Server Error").with_source(failure));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic
mod tests {
    use super::*;
    use crate::native::Signal;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("lookup failed")]
    struct LookupFailed;

    fn call(native: &NativeHandler) -> (Response, Next, impl Future<Output = ()>) {
        let request = Request::from_http(
            http::Request::builder().uri("/x").body(Bytes::new()).unwrap(),
        );
        let response = Response::new();
        let next = Next::new();
        let fut = native(request, response.clone(), next.clone());
        (response, next, fut)
    }

    fn counting<E: 'static>(calls: Arc<AtomicUsize>) -> impl ExitPolicy<E> {
        move |_outcome: Outcome<E>, _ctx: &RequestContext| {
            calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_success_leaves_continuation_alone() {
        let native = adapt(
            Arc::from("GET /x"),
            Arc::new(()),
            Arc::new(|cx: HandlerContext<()>| async move {
                cx.response().send("done");
                Ok::<(), LookupFailed>(())
            }),
            Arc::new(ForwardErrors),
        );
        let (response, next, fut) = call(&native);
        fut.await;
        assert!(response.is_sent());
        assert!(next.take().is_none());
    }

    #[tokio::test]
    async fn test_error_is_forwarded_to_continuation() {
        let native = adapt(
            Arc::from("GET /x"),
            Arc::new(()),
            Arc::new(|_cx: HandlerContext<()>| async { Err::<(), _>(LookupFailed) }),
            Arc::new(ForwardErrors),
        );
        let (_, next, fut) = call(&native);
        fut.await;
        match next.take() {
            Some(Signal::Fail(err)) => assert_eq!(err.to_string(), "lookup failed"),
            other => panic!("expected forwarded failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panic_becomes_outcome() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_in_policy = Arc::clone(&seen);
        let policy = move |outcome: Outcome<LookupFailed>, _ctx: &RequestContext| {
            *seen_in_policy.lock().unwrap() = outcome.err().map(|f| f.to_string());
        };
        let native = adapt(
            Arc::from("GET /x"),
            Arc::new(()),
            Arc::new(|cx: HandlerContext<()>| async move {
                if cx.params().is_empty() {
                    panic!("kaboom");
                }
                Ok::<(), LookupFailed>(())
            }),
            Arc::new(policy),
        );
        let (_, _, fut) = call(&native);
        fut.await;
        assert_eq!(seen.lock().unwrap().as_deref(), Some("handler panicked: kaboom"));
    }

    #[tokio::test]
    async fn test_exit_policy_runs_once_per_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let native = adapt(
            Arc::from("GET /x"),
            Arc::new(()),
            Arc::new(|_cx: HandlerContext<()>| async { Err::<(), _>(LookupFailed) }),
            Arc::new(counting::<LookupFailed>(Arc::clone(&calls))),
        );
        for _ in 0..3 {
            let (_, _, fut) = call(&native);
            fut.await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_context_bound_during_handler_and_policy_only() {
        let bound_in_policy = Arc::new(AtomicUsize::new(0));
        let probe = Arc::clone(&bound_in_policy);
        let native = adapt(
            Arc::from("GET /x"),
            Arc::new(()),
            Arc::new(|cx: HandlerContext<()>| async move {
                let ambient = context::retrieve().unwrap();
                assert!(ambient.response().same_as(cx.response()));
                Ok::<(), LookupFailed>(())
            }),
            Arc::new(move |outcome: Outcome<LookupFailed>, _ctx: &RequestContext| {
                if outcome.is_ok() && context::is_bound() {
                    probe.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );
        let (_, next, fut) = call(&native);
        fut.await;
        assert_eq!(bound_in_policy.load(Ordering::SeqCst), 1);
        assert!(!next.is_signalled());
        assert!(!context::is_bound());
    }

    #[tokio::test]
    async fn test_panicking_policy_is_contained() {
        let native = adapt(
            Arc::from("GET /x"),
            Arc::new(()),
            Arc::new(|_cx: HandlerContext<()>| async { Ok::<(), LookupFailed>(()) }),
            Arc::new(|_o: Outcome<LookupFailed>, _ctx: &RequestContext| panic!("bad policy")),
        );
        let (_, next, fut) = call(&native);
        fut.await;
        assert!(matches!(next.take(), Some(Signal::Fail(_))));
    }

    #[tokio::test]
    async fn test_silent_policy_ignores_failures() {
        let native = adapt(
            Arc::from("GET /x"),
            Arc::new(()),
            Arc::new(|_cx: HandlerContext<()>| async { Err::<(), _>(LookupFailed) }),
            Arc::new(Silent),
        );
        let (_, next, fut) = call(&native);
        fut.await;
        assert!(!next.is_signalled());
    }

    #[test]
    fn test_into_box_error_keeps_handler_error_downcastable() {
        let boxed = into_box_error(Failure::Handler(HttpError::bad_request("nope")));
        assert!(boxed.downcast_ref::<HttpError>().is_some());
        let boxed = into_box_error::<HttpError>(Failure::Panicked("x".into()));
        assert_eq!(boxed.to_string(), "handler panicked: x");
    }
}
