//! Ergonomic request testing for built apps
//!
//! This module provides a fluent API for driving an [`App`] in-process with
//! readable When-Then syntax, without binding a socket.

#![allow(clippy::module_name_repetitions)] // RequestTest is the natural name

use bytes::Bytes;
use composable_http_runtime::{App, Request};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;

/// Type alias for response assertion functions
type ResponseAssertion = Box<dyn FnOnce(&TestResponse) + Send>;

/// A response as observed by the test.
#[derive(Debug, Clone)]
pub struct TestResponse {
    /// Final status
    pub status: StatusCode,
    /// Final headers
    pub headers: HeaderMap,
    /// Body bytes
    pub body: Bytes,
}

impl TestResponse {
    /// Body as UTF-8 text (lossy).
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// A header value as text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Dispatch `request` through `app` and collect the response.
pub async fn send(app: &App, request: http::Request<Bytes>) -> TestResponse {
    let response = app.handle(Request::from_http(request)).await;
    let (status, headers, body) = response.take_parts();
    TestResponse {
        status,
        headers,
        body,
    }
}

/// Fluent API for testing apps with When-Then syntax
///
/// # Example
///
/// ```ignore
/// use composable_http_testing::RequestTest;
///
/// RequestTest::new(&app)
///     .get("/health")
///     .then_status(StatusCode::OK)
///     .then_body("All is good in the hood")
///     .run()
///     .await;
/// ```
pub struct RequestTest<'a> {
    app: &'a App,
    method: Method,
    uri: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Bytes,
    assertions: Vec<ResponseAssertion>,
}

impl<'a> RequestTest<'a> {
    /// Create a new request test against `app`; defaults to `GET /`.
    #[must_use]
    pub fn new(app: &'a App) -> Self {
        Self {
            app,
            method: Method::GET,
            uri: "/".to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
            assertions: Vec::new(),
        }
    }

    /// Set the request line (When)
    #[must_use]
    pub fn when(mut self, method: Method, uri: impl Into<String>) -> Self {
        self.method = method;
        self.uri = uri.into();
        self
    }

    /// Shorthand for `when(Method::GET, uri)`
    #[must_use]
    pub fn get(self, uri: impl Into<String>) -> Self {
        self.when(Method::GET, uri)
    }

    /// Add a request header
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    /// Set the request body
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Expect a status (Then)
    #[must_use]
    pub fn then_status(self, expected: StatusCode) -> Self {
        self.then_response(move |res| {
            assert_eq!(res.status, expected, "unexpected status; body: {}", res.text());
        })
    }

    /// Expect a text body (Then)
    #[must_use]
    pub fn then_body(self, expected: impl Into<String>) -> Self {
        let expected = expected.into();
        self.then_response(move |res| assert_eq!(res.text(), expected))
    }

    /// Expect a header value (Then)
    #[must_use]
    pub fn then_header(self, name: &'static str, expected: impl Into<String>) -> Self {
        let expected = expected.into();
        self.then_response(move |res| assert_eq!(res.header(name), Some(expected.as_str())))
    }

    /// Add an arbitrary assertion about the response (Then)
    #[must_use]
    pub fn then_response<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&TestResponse) + Send + 'static,
    {
        self.assertions.push(Box::new(assertion));
        self
    }

    /// Run the request and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or if any assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    pub async fn run(self) -> TestResponse {
        let mut builder = http::Request::builder().method(self.method).uri(&self.uri);
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        let request = match builder.body(self.body) {
            Ok(request) => request,
            Err(err) => panic!("invalid test request for {}: {err}", self.uri),
        };

        let response = send(self.app, request).await;
        for assertion in self.assertions {
            assertion(&response);
        }
        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use composable_http_runtime::native::sync_handler;
    use composable_http_runtime::{Method as Verb, Pipeline};
    use std::sync::Arc;

    async fn echo_app() -> App {
        Pipeline::<()>::app()
            .classic(
                Verb::Post,
                "/echo",
                [sync_handler(|req, res, _| {
                    let body = req.body().clone();
                    res.status(StatusCode::CREATED).send(body);
                })],
            )
            .build(Arc::new(()))
            .await
            .unwrap()
            .into_app()
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_test_runs_assertions() {
        let app = echo_app().await;
        let response = RequestTest::new(&app)
            .when(Method::POST, "/echo")
            .body("ping")
            .then_status(StatusCode::CREATED)
            .then_body("ping")
            .then_header("content-type", "text/plain; charset=utf-8")
            .run()
            .await;
        assert_eq!(response.body, Bytes::from("ping"));
    }

    #[tokio::test]
    async fn test_unmatched_request() {
        let app = echo_app().await;
        RequestTest::new(&app)
            .get("/echo")
            .then_status(StatusCode::NOT_FOUND)
            .then_body("Cannot GET /echo")
            .run()
            .await;
    }
}
