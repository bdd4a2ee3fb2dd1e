//! Immutable routing table and the native dispatcher.
//!
//! A table is an ordered list of layers. Dispatch walks the layers in
//! registration order, so among layers that match a request the first one
//! registered runs first. Each callback's continuation decides whether the
//! walk continues (`proceed`), switches to the error chain (`fail`) or stops
//! (no signal).

use crate::native::{ErrorHandler, NativeHandler, Next, Request, Response, Signal};
use composable_http_core::{BoxError, HttpError, MatchOptions, Method, PathPattern};
use futures::future::BoxFuture;
use http::StatusCode;
use std::sync::Arc;

pub(crate) enum LayerKind {
    /// Exact-path route for one method.
    Route {
        method: Method,
        handler: NativeHandler,
    },
    /// Prefix middleware for every method.
    Middleware(NativeHandler),
    /// Prefix error middleware; only runs while an error is pending.
    Error(ErrorHandler),
    /// A mounted sub-router.
    Mount(Arc<RoutingTable>),
}

pub(crate) struct Layer {
    pub(crate) pattern: PathPattern,
    pub(crate) kind: LayerKind,
}

/// Where a walk over one table ended.
pub(crate) enum Flow {
    /// Some layer finished the request.
    Done,
    /// Every matching layer passed the request on.
    Continue,
    /// An error is still pending at the end of the table.
    Error(BoxError),
}

/// One registered route, as listed by [`RoutingTable::routes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Method the route was registered for.
    pub method: Method,
    /// Full path, including mount prefixes.
    pub path: String,
}

/// Finalized, immutable layer list for an app or router.
pub struct RoutingTable {
    layers: Vec<Layer>,
    options: MatchOptions,
}

impl std::fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingTable")
            .field("layers", &self.layers.len())
            .field("options", &self.options)
            .finish()
    }
}

impl RoutingTable {
    pub(crate) const fn new(layers: Vec<Layer>, options: MatchOptions) -> Self {
        Self { layers, options }
    }

    /// Number of top-level layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether nothing was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Every route in dispatch order, with mount prefixes applied.
    #[must_use]
    pub fn routes(&self) -> Vec<RouteEntry> {
        let mut out = Vec::new();
        self.collect_routes("/", &mut out);
        out
    }

    fn collect_routes(&self, prefix: &str, out: &mut Vec<RouteEntry>) {
        for layer in &self.layers {
            let path = composable_http_core::path::join(prefix, layer.pattern.as_str());
            match &layer.kind {
                LayerKind::Route { method, .. } => out.push(RouteEntry {
                    method: *method,
                    path,
                }),
                LayerKind::Mount(table) => table.collect_routes(&path, out),
                LayerKind::Middleware(_) | LayerKind::Error(_) => {},
            }
        }
    }

    /// Dispatch one request through the table, including the final handler.
    ///
    /// Unhandled requests get `404 Cannot <METHOD> <path>`; unhandled errors
    /// are rendered from [`HttpError`] when possible, else as `500`.
    pub async fn handle(&self, request: Request) -> Response {
        let response = Response::new();
        let method = request.method().clone();
        let path = request.original_path().to_string();

        match self.dispatch(request, response.clone(), None).await {
            Flow::Done => {
                if !response.is_sent() {
                    tracing::warn!(%method, %path, "handler returned without sending a response");
                }
            },
            Flow::Continue => {
                if !response.is_sent() {
                    metrics::counter!("http.dispatch.unmatched").increment(1);
                    tracing::debug!(%method, %path, "no layer handled request");
                    response
                        .status(StatusCode::NOT_FOUND)
                        .send(format!("Cannot {method} {path}"));
                }
            },
            Flow::Error(error) => render_error(&error, &response, &method, &path),
        }

        response
    }

    pub(crate) fn dispatch<'a>(
        &'a self,
        request: Request,
        response: Response,
        error: Option<BoxError>,
    ) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            let mut pending = error;

            for layer in &self.layers {
                if response.is_sent() {
                    return Flow::Done;
                }

                let next = Next::new();
                match (&layer.kind, pending.take()) {
                    (LayerKind::Route { method, handler }, None) => {
                        if !method.accepts(request.method()) {
                            continue;
                        }
                        let Some(params) = layer.pattern.match_exact(request.path(), self.options)
                        else {
                            continue;
                        };
                        let req = request.rebase(
                            params,
                            request.base_url().to_string(),
                            request.path().to_string(),
                        );
                        handler(req, response.clone(), next.clone()).await;
                    },
                    (LayerKind::Middleware(handler), None) => {
                        let Some(m) = layer.pattern.match_prefix(request.path(), self.options) else {
                            continue;
                        };
                        let base = format!("{}{}", request.base_url(), m.base);
                        handler(request.rebase(m.params, base, m.rest), response.clone(), next.clone())
                            .await;
                    },
                    (LayerKind::Error(handler), Some(err)) => {
                        let Some(m) = layer.pattern.match_prefix(request.path(), self.options) else {
                            pending = Some(err);
                            continue;
                        };
                        let base = format!("{}{}", request.base_url(), m.base);
                        handler(
                            err,
                            request.rebase(m.params, base, m.rest),
                            response.clone(),
                            next.clone(),
                        )
                        .await;
                    },
                    (LayerKind::Mount(table), err) => {
                        let Some(m) = layer.pattern.match_prefix(request.path(), self.options) else {
                            pending = err;
                            continue;
                        };
                        let base = format!("{}{}", request.base_url(), m.base);
                        let sub = request.rebase(m.params, base, m.rest);
                        match table.dispatch(sub, response.clone(), err).await {
                            Flow::Done => return Flow::Done,
                            Flow::Continue => {},
                            Flow::Error(e) => pending = Some(e),
                        }
                        continue;
                    },
                    // Normal layers are skipped while an error is pending, and
                    // error layers are skipped while none is.
                    (_, err) => {
                        pending = err;
                        continue;
                    },
                }

                match next.take() {
                    Some(Signal::Proceed) => {},
                    Some(Signal::Fail(e)) => pending = Some(e),
                    None => return Flow::Done,
                }
            }

            if response.is_sent() {
                return Flow::Done;
            }
            pending.map_or(Flow::Continue, Flow::Error)
        })
    }
}

fn render_error(error: &BoxError, response: &Response, method: &http::Method, path: &str) {
    let (status, message) = error.downcast_ref::<HttpError>().map_or_else(
        || {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusCode::INTERNAL_SERVER_ERROR
                    .canonical_reason()
                    .unwrap_or("Internal Server Error")
                    .to_string(),
            )
        },
        |e| (e.status(), e.message().to_string()),
    );

    if status.is_server_error() {
        tracing::error!(%method, %path, %status, error = %error, "unhandled error in request pipeline");
    } else {
        tracing::debug!(%method, %path, %status, error = %error, "request failed");
    }

    if response.is_sent() {
        tracing::warn!(%method, %path, "error raised after response was sent");
        return;
    }
    response.status(status).send(message);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::native::{self, sync_handler};
    use bytes::Bytes;

    fn layer(method: Method, path: &str, handler: NativeHandler) -> Layer {
        Layer {
            pattern: PathPattern::parse(path).unwrap(),
            kind: LayerKind::Route { method, handler },
        }
    }

    fn request(method: http::Method, uri: &str) -> Request {
        Request::from_http(
            http::Request::builder()
                .method(method)
                .uri(uri)
                .body(Bytes::new())
                .unwrap(),
        )
    }

    async fn body_of(table: &RoutingTable, method: http::Method, uri: &str) -> (StatusCode, String) {
        let res = table.handle(request(method, uri)).await;
        let (status, _, body) = res.take_parts();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_first_registered_route_wins() {
        let table = RoutingTable::new(
            vec![
                layer(Method::Get, "/user/:id", sync_handler(|_, res, _| res.send("param"))),
                layer(Method::Get, "/user/fail", sync_handler(|_, res, _| res.send("literal"))),
            ],
            MatchOptions::default(),
        );
        assert_eq!(body_of(&table, http::Method::GET, "/user/fail").await.1, "param");
    }

    #[tokio::test]
    async fn test_proceed_falls_through_to_next_match() {
        let table = RoutingTable::new(
            vec![
                layer(Method::Get, "/x", sync_handler(|_, _, next| next.proceed())),
                layer(Method::Get, "/x", sync_handler(|_, res, _| res.send("second"))),
            ],
            MatchOptions::default(),
        );
        assert_eq!(body_of(&table, http::Method::GET, "/x").await.1, "second");
    }

    #[tokio::test]
    async fn test_unmatched_is_404() {
        let table = RoutingTable::new(Vec::new(), MatchOptions::default());
        assert_eq!(
            body_of(&table, http::Method::POST, "/nowhere").await,
            (StatusCode::NOT_FOUND, "Cannot POST /nowhere".to_string())
        );
    }

    #[tokio::test]
    async fn test_method_must_match() {
        let table = RoutingTable::new(
            vec![layer(Method::Post, "/x", sync_handler(|_, res, _| res.send("posted")))],
            MatchOptions::default(),
        );
        assert_eq!(body_of(&table, http::Method::GET, "/x").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_failure_skips_routes_and_reaches_error_layer() {
        let table = RoutingTable::new(
            vec![
                layer(Method::Get, "/x", sync_handler(|_, _, next| {
                    next.fail(std::io::Error::other("boom"));
                })),
                layer(Method::Get, "/x", sync_handler(|_, res, _| res.send("never"))),
                Layer {
                    pattern: PathPattern::parse("/").unwrap(),
                    kind: LayerKind::Error(native::error_handler(|err, _, res, _| async move {
                        res.status(StatusCode::BAD_GATEWAY).send(format!("handled: {err}"));
                    })),
                },
            ],
            MatchOptions::default(),
        );
        assert_eq!(
            body_of(&table, http::Method::GET, "/x").await,
            (StatusCode::BAD_GATEWAY, "handled: boom".to_string())
        );
    }

    #[tokio::test]
    async fn test_unhandled_errors_render_status() {
        let table = RoutingTable::new(
            vec![
                layer(Method::Get, "/plain", sync_handler(|_, _, next| {
                    next.fail(std::io::Error::other("secret detail"));
                })),
                layer(Method::Get, "/typed", sync_handler(|_, _, next| {
                    next.fail(HttpError::bad_request("id must be numeric"));
                })),
            ],
            MatchOptions::default(),
        );
        assert_eq!(
            body_of(&table, http::Method::GET, "/plain").await,
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
        );
        assert_eq!(
            body_of(&table, http::Method::GET, "/typed").await,
            (StatusCode::BAD_REQUEST, "id must be numeric".to_string())
        );
    }

    #[tokio::test]
    async fn test_mount_strips_prefix() {
        let inner = RoutingTable::new(
            vec![layer(Method::Get, "/:id", sync_handler(|req, res, _| {
                res.send(format!("{}|{}|{}", req.base_url(), req.path(), req.param("id").unwrap_or("")));
            }))],
            MatchOptions::default(),
        );
        let table = RoutingTable::new(
            vec![Layer {
                pattern: PathPattern::parse("/user").unwrap(),
                kind: LayerKind::Mount(Arc::new(inner)),
            }],
            MatchOptions::default(),
        );
        assert_eq!(body_of(&table, http::Method::GET, "/user/7").await.1, "/user|/7|7");
        assert_eq!(
            table.routes(),
            vec![RouteEntry { method: Method::Get, path: "/user/:id".to_string() }]
        );
    }

    #[tokio::test]
    async fn test_head_served_by_get_route() {
        let table = RoutingTable::new(
            vec![layer(Method::Get, "/health", sync_handler(|_, res, _| res.send("ok")))],
            MatchOptions::default(),
        );
        assert_eq!(body_of(&table, http::Method::HEAD, "/health").await.0, StatusCode::OK);
    }
}
