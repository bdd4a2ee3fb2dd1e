//! Serving a built [`App`] through axum.
//!
//! axum owns the protocol; the app owns routing. Every request reaches a
//! single fallback handler that collects the body, hands the request to the
//! app's routing table and converts the native response back.

use crate::config::ServerConfig;
use crate::middleware::correlation_id_layer;
use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use composable_http_runtime::{App, native};
use http::StatusCode;
use tower_http::trace::TraceLayer;

/// Wrap `app` in an axum router with tracing and correlation IDs.
#[must_use]
pub fn into_router(app: App, config: &ServerConfig) -> axum::Router {
    let limit = config.body_limit_bytes;
    axum::Router::new()
        .fallback(move |request: Request| {
            let app = app.clone();
            async move { dispatch(&app, request, limit).await }
        })
        .layer(correlation_id_layer())
        .layer(TraceLayer::new_for_http())
}

/// Run one axum request through `app`.
///
/// Bodies larger than `body_limit` are rejected with `413` before the app
/// sees the request. Once dispatched, the request runs on its own task, so a
/// client that disconnects does not cut its handler pipeline short.
pub async fn dispatch(app: &App, request: Request, body_limit: usize) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, body_limit).await {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(error = %err, limit = body_limit, "request body rejected");
            metrics::counter!("http.request.rejected", "reason" => "body_limit").increment(1);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response();
        },
    };

    let app = app.clone();
    let request = native::Request::new(parts, body);
    let response = match tokio::spawn(async move { app.handle(request).await }).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "request task failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
        },
    };
    let (status, headers, body) = response.take_parts();

    let mut out = Response::new(Body::from(body));
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::middleware::{CORRELATION_ID_HEADER, CorrelationIdExt};
    use composable_http_runtime::prelude::*;
    use tower::ServiceExt;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn router(limit: usize) -> axum::Router {
        let app = Pipeline::<()>::app()
            .get("/whoami", |cx: HandlerContext<()>| async move {
                let id = cx.request().correlation_id().ok_or("no correlation id")?;
                cx.response().send(id.to_string());
                Ok::<_, BoxError>(())
            })
            .classic(
                Method::Post,
                "/echo",
                [native::sync_handler(|req, res, _| {
                    res.set_header(http::header::HeaderName::from_static("x-echo"), "yes");
                    res.send(req.body().clone());
                })],
            )
            .build(Arc::new(()))
            .await
            .unwrap()
            .into_app()
            .unwrap();
        let config = ServerConfig {
            body_limit_bytes: limit,
            ..ServerConfig::default()
        };
        into_router(app, &config)
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_native_response_is_converted() {
        let request = http::Request::builder()
            .method("POST")
            .uri("/echo")
            .body(Body::from("hello"))
            .unwrap();
        let response = router(1024).await.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-echo"], "yes");
        assert_eq!(
            response.headers()[http::header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_text(response).await, "hello");
    }

    #[tokio::test]
    async fn test_unmatched_request_gets_native_404() {
        let request = http::Request::builder().uri("/missing").body(Body::empty()).unwrap();
        let response = router(1024).await.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "Cannot GET /missing");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let request = http::Request::builder()
            .method("POST")
            .uri("/echo")
            .body(Body::from(vec![b'x'; 64]))
            .unwrap();
        let response = router(16).await.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_correlation_id_reaches_native_handlers() {
        let request = http::Request::builder().uri("/whoami").body(Body::empty()).unwrap();
        let response = router(1024).await.oneshot(request).await.unwrap();
        let echoed = response.headers()[CORRELATION_ID_HEADER].to_str().unwrap().to_string();
        assert_eq!(body_text(response).await, echoed);
    }

    #[tokio::test]
    async fn test_disconnect_does_not_abort_pipeline() {
        let exits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&exits);
        let app = Pipeline::<()>::app()
            .route_with(
                Method::Get,
                "/slow",
                |cx: HandlerContext<()>| async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    cx.response().send("done");
                    Ok::<_, BoxError>(())
                },
                move |outcome: Outcome<BoxError>, _: &RequestContext| {
                    if outcome.is_ok() {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                },
            )
            .build(Arc::new(()))
            .await
            .unwrap()
            .into_app()
            .unwrap();

        let request = http::Request::builder().uri("/slow").body(Body::empty()).unwrap();
        let call = into_router(app, &ServerConfig::default()).oneshot(request);
        assert!(tokio::time::timeout(Duration::from_millis(10), call).await.is_err());
        assert_eq!(exits.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }
}
