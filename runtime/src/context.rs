//! Request-scoped context registry.
//!
//! While a handler pipeline runs, the [`RequestContext`] of its request is
//! bound to the task executing it. Code anywhere below the handler can then
//! call [`retrieve`] instead of threading the context through every call.
//!
//! The binding is a dynamic scope, not a global: [`bind`] installs the context
//! for the duration of one future and removes it when that future completes,
//! fails or panics. Handler pipelines run to settlement; the web bridge gives
//! each request its own task so a disconnect cannot cut one short. Concurrent
//! requests never see each other's binding. Tasks spawned from inside a
//! handler do not inherit it.
//!
//! # Example
//!
//! ```ignore
//! async fn current_user_id() -> Result<String, ContextError> {
//!     let ctx = context::retrieve_typed::<UserParams>()?;
//!     Ok(ctx.params.id)
//! }
//! ```

use crate::native::{Next, Request, Response};
use composable_http_core::{ContextError, Params, PathParams};
use std::future::Future;
use std::ops::Deref;

/// The per-call bundle: inbound request, outbound response, continuation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request: Request,
    response: Response,
    next: Next,
}

impl RequestContext {
    /// Bundle one native call's arguments.
    #[must_use]
    pub const fn new(request: Request, response: Response, next: Next) -> Self {
        Self {
            request,
            response,
            next,
        }
    }

    /// Inbound request.
    #[must_use]
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Outbound response writer.
    #[must_use]
    pub const fn response(&self) -> &Response {
        &self.response
    }

    /// Continuation of this call.
    #[must_use]
    pub const fn next(&self) -> &Next {
        &self.next
    }

    /// Path parameters of the matched route.
    #[must_use]
    pub const fn params(&self) -> &Params {
        self.request.params()
    }

    /// Typed view of the path parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::MissingParam`] if a name expected by `P` was not bound.
    pub fn params_as<P: PathParams>(&self) -> Result<P, ContextError> {
        P::from_params(self.request.params())
    }
}

/// A [`RequestContext`] together with its typed path parameters.
#[derive(Debug, Clone)]
pub struct RouteContext<P> {
    /// Typed parameters.
    pub params: P,
    /// Underlying context.
    pub context: RequestContext,
}

impl<P> Deref for RouteContext<P> {
    type Target = RequestContext;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// Run `computation` with `context` bound, then unbind it.
///
/// Unbinding happens on every exit path, including panics and the future
/// being dropped before completion. Nested bindings shadow the outer one and
/// restore it when they end.
pub async fn bind<F: Future>(context: RequestContext, computation: F) -> F::Output {
    CURRENT.scope(context, computation).await
}

/// The context bound to the current computation.
///
/// # Errors
///
/// Returns [`ContextError::Unavailable`] outside any [`bind`] scope.
pub fn retrieve() -> Result<RequestContext, ContextError> {
    CURRENT
        .try_with(Clone::clone)
        .map_err(|_| ContextError::Unavailable)
}

/// The bound context, with path parameters typed as `P`.
///
/// This is the same context [`retrieve`] returns; only the parameter view
/// differs.
///
/// # Errors
///
/// Returns [`ContextError::Unavailable`] outside a binding, or
/// [`ContextError::MissingParam`] if the matched pattern lacks a name `P` needs.
pub fn retrieve_typed<P: PathParams>() -> Result<RouteContext<P>, ContextError> {
    let context = retrieve()?;
    let params = context.params_as::<P>()?;
    Ok(RouteContext { params, context })
}

/// Whether a context is bound to the current computation.
#[must_use]
pub fn is_bound() -> bool {
    CURRENT.try_with(|_| ()).is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::FutureExt;
    use std::panic::AssertUnwindSafe;

    fn context_for(uri: &str) -> RequestContext {
        let request = Request::from_http(
            http::Request::builder().uri(uri).body(Bytes::new()).unwrap(),
        );
        RequestContext::new(request, Response::new(), Next::new())
    }

    #[tokio::test]
    async fn test_retrieve_outside_binding_fails() {
        assert_eq!(retrieve().unwrap_err(), ContextError::Unavailable);
        assert!(!is_bound());
    }

    #[tokio::test]
    async fn test_binding_is_visible_to_callees() {
        async fn deep() -> String {
            retrieve().unwrap().request().path().to_string()
        }

        let path = bind(context_for("/a"), async { deep().await }).await;
        assert_eq!(path, "/a");
        assert!(!is_bound());
    }

    #[tokio::test]
    async fn test_nested_binding_restores_outer() {
        bind(context_for("/outer"), async {
            bind(context_for("/inner"), async {
                assert_eq!(retrieve().unwrap().request().path(), "/inner");
            })
            .await;
            assert_eq!(retrieve().unwrap().request().path(), "/outer");
        })
        .await;
    }

    #[tokio::test]
    async fn test_unbound_after_panic() {
        let result = AssertUnwindSafe(bind(context_for("/p"), async {
            panic!("handler blew up");
        }))
        .catch_unwind()
        .await;
        assert!(result.is_err());
        assert!(!is_bound());
    }

    #[tokio::test]
    async fn test_spawned_tasks_do_not_inherit() {
        let seen = bind(context_for("/a"), async {
            tokio::spawn(async { is_bound() }).await.unwrap()
        })
        .await;
        assert!(!seen);
    }
}
