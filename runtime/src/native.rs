//! The native, continuation-passing handler model.
//!
//! Every registered callback receives the same three arguments:
//!
//! - [`Request`]: the inbound request, with the parameters of the layer that
//!   matched it and the path relative to the router it was mounted in
//! - [`Response`]: a shared writer; the first `send`/`json`/`end` wins
//! - [`Next`]: a one-shot continuation used to hand control to the next
//!   matching layer (`proceed`) or to the error chain (`fail`)
//!
//! Callbacks are async; the dispatcher awaits each one before looking at the
//! continuation and the response to decide where to go next.

use bytes::Bytes;
use composable_http_core::{BoxError, Params};
use futures::future::BoxFuture;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Extensions, Method, StatusCode, Uri};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A native callback: `(request, response, continuation)`.
pub type NativeHandler = Arc<dyn Fn(Request, Response, Next) -> BoxFuture<'static, ()> + Send + Sync>;

/// A native error callback: `(error, request, response, continuation)`.
pub type ErrorHandler =
    Arc<dyn Fn(BoxError, Request, Response, Next) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`NativeHandler`].
pub fn handler<F, Fut>(f: F) -> NativeHandler
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |req, res, next| Box::pin(f(req, res, next)))
}

/// Wrap a synchronous closure as a [`NativeHandler`].
///
/// ```
/// use composable_http_runtime::native;
///
/// let health = native::sync_handler(|_req, res, _next| {
///     res.send("All is good in the hood");
/// });
/// # let _ = health;
/// ```
pub fn sync_handler<F>(f: F) -> NativeHandler
where
    F: Fn(Request, Response, Next) + Send + Sync + 'static,
{
    Arc::new(move |req, res, next| {
        f(req, res, next);
        Box::pin(futures::future::ready(()))
    })
}

/// Wrap an async closure as an [`ErrorHandler`].
pub fn error_handler<F, Fut>(f: F) -> ErrorHandler
where
    F: Fn(BoxError, Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |err, req, res, next| Box::pin(f(err, req, res, next)))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Request
// ============================================================================

#[derive(Debug)]
struct Inbound {
    parts: http::request::Parts,
    body: Bytes,
}

/// The inbound request as seen by one layer.
///
/// Cloning is cheap; clones share the underlying request.
#[derive(Debug, Clone)]
pub struct Request {
    inbound: Arc<Inbound>,
    params: Params,
    base_url: String,
    path: String,
}

impl Request {
    /// Build a request from its head and a fully collected body.
    #[must_use]
    pub fn new(parts: http::request::Parts, body: Bytes) -> Self {
        let path = parts.uri.path().to_string();
        Self {
            inbound: Arc::new(Inbound { parts, body }),
            params: Params::new(),
            base_url: String::new(),
            path,
        }
    }

    /// Build a request from an `http::Request` with a collected body.
    #[must_use]
    pub fn from_http(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self::new(parts, body)
    }

    /// The same request as seen by a deeper layer.
    pub(crate) fn rebase(&self, params: Params, base_url: String, path: String) -> Self {
        Self {
            inbound: Arc::clone(&self.inbound),
            params,
            base_url,
            path,
        }
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.inbound.parts.method
    }

    /// Full request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.inbound.parts.uri
    }

    /// Path as originally received, before any mount prefix was stripped.
    #[must_use]
    pub fn original_path(&self) -> &str {
        self.inbound.parts.uri.path()
    }

    /// Path relative to the router this layer is mounted in.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Mount prefix consumed before reaching this layer.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.inbound.parts.headers
    }

    /// A header value, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// Extensions inserted by upstream middleware.
    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.inbound.parts.extensions
    }

    /// Raw request body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.inbound.body
    }

    /// Deserialize the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.inbound.body)
    }

    /// Parameters bound by the matching layer.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// A single parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }
}

// ============================================================================
// Response
// ============================================================================

#[derive(Debug, Default)]
struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    sent: bool,
}

/// Shared response writer.
///
/// All layers handling one request write to the same response. Once a body
/// has been sent, further writes are ignored.
#[derive(Debug, Clone, Default)]
pub struct Response {
    state: Arc<Mutex<ResponseState>>,
}

impl Response {
    /// A fresh `200 OK` response with no headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status code.
    pub fn status(&self, status: StatusCode) -> &Self {
        let mut state = lock(&self.state);
        if state.sent {
            tracing::warn!(%status, "status set after response was sent; ignoring");
        } else {
            state.status = status;
        }
        self
    }

    /// Set a header, replacing any previous value.
    ///
    /// Values that are not valid header values are dropped with a warning.
    pub fn set_header(&self, name: HeaderName, value: &str) -> &Self {
        let mut state = lock(&self.state);
        if state.sent {
            tracing::warn!(header = %name, "header set after response was sent; ignoring");
            return self;
        }
        match HeaderValue::from_str(value) {
            Ok(value) => {
                state.headers.insert(name, value);
            },
            Err(err) => tracing::warn!(header = %name, error = %err, "invalid header value"),
        }
        self
    }

    /// Send a body; defaults the content type to plain text.
    pub fn send(&self, body: impl Into<Bytes>) {
        self.finish(body.into(), "text/plain; charset=utf-8");
    }

    /// Serialize `value` as JSON and send it; defaults the content type to JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if `value` cannot be serialized; nothing
    /// is sent in that case.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        self.finish(Bytes::from(body), "application/json");
        Ok(())
    }

    /// Finish the response without a body.
    pub fn end(&self) {
        let mut state = lock(&self.state);
        state.sent = true;
    }

    fn finish(&self, body: Bytes, default_content_type: &'static str) {
        let mut state = lock(&self.state);
        if state.sent {
            tracing::warn!("response already sent; ignoring body");
            return;
        }
        state
            .headers
            .entry(header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(default_content_type));
        state.body = body;
        state.sent = true;
    }

    /// Whether a body (or `end`) has been sent.
    #[must_use]
    pub fn is_sent(&self) -> bool {
        lock(&self.state).sent
    }

    /// Current status code.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        lock(&self.state).status
    }

    /// Current value of a header.
    #[must_use]
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<String> {
        lock(&self.state)
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Take the written status, headers and body, leaving the writer empty.
    #[must_use]
    pub fn take_parts(&self) -> (StatusCode, HeaderMap, Bytes) {
        let mut state = lock(&self.state);
        let status = state.status;
        (
            status,
            std::mem::take(&mut state.headers),
            std::mem::take(&mut state.body),
        )
    }

    /// Whether two handles write to the same response.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

// ============================================================================
// Continuation
// ============================================================================

/// What a layer asked the dispatcher to do next.
#[derive(Debug)]
pub enum Signal {
    /// Continue with the next matching layer.
    Proceed,
    /// Enter the error chain with this error.
    Fail(BoxError),
}

/// One-shot continuation handed to every native callback.
///
/// Only the first signal counts; later ones are logged and dropped.
#[derive(Debug, Clone, Default)]
pub struct Next {
    slot: Arc<Mutex<Option<Signal>>>,
}

impl Next {
    /// A fresh, unsignalled continuation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn signal(&self, signal: Signal) {
        let mut slot = lock(&self.slot);
        if slot.is_some() {
            tracing::warn!(?signal, "continuation already signalled; ignoring");
            return;
        }
        *slot = Some(signal);
    }

    /// Pass control to the next matching layer.
    pub fn proceed(&self) {
        self.signal(Signal::Proceed);
    }

    /// Hand `error` to the error chain.
    pub fn fail(&self, error: impl Into<BoxError>) {
        self.signal(Signal::Fail(error.into()));
    }

    /// Whether `proceed` or `fail` was called.
    #[must_use]
    pub fn is_signalled(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Consume the signal, if any.
    #[must_use]
    pub fn take(&self) -> Option<Signal> {
        lock(&self.slot).take()
    }
}
