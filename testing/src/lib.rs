//! # Composable HTTP Testing
//!
//! Testing utilities and helpers for composable HTTP pipelines.
//!
//! This crate provides:
//! - Recording exit policies and context probes
//! - A fluent request harness for built apps
//! - Property-based testing strategies for path patterns
//!
//! ## Example
//!
//! ```ignore
//! use composable_http_testing::{RecordingExitPolicy, RequestTest};
//!
//! #[tokio::test]
//! async fn test_lookup_failure() {
//!     let policy = RecordingExitPolicy::new();
//!     let app = Pipeline::app()
//!         .route_with(Method::Get, "/user/:id", lookup, policy.clone())
//!         .build(Arc::new(env))
//!         .await
//!         .unwrap()
//!         .into_app()
//!         .unwrap();
//!
//!     RequestTest::new(&app)
//!         .get("/user/99")
//!         .then_status(StatusCode::NOT_FOUND)
//!         .run()
//!         .await;
//!
//!     assert_eq!(policy.len(), 1);
//! }
//! ```

pub mod request_test;

/// Test doubles for exit policies and the context registry.
pub mod mocks {
    use composable_http_core::{ContextError, Outcome};
    use composable_http_runtime::context;
    use composable_http_runtime::{ExitPolicy, ForwardErrors, RequestContext, Silent};
    use std::fmt::Display;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One exit-policy invocation.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ExitRecord {
        /// Request method.
        pub method: String,
        /// Full request path.
        pub path: String,
        /// `ok`, `error` or `panic`.
        pub outcome: &'static str,
        /// Rendered failure, if any.
        pub message: Option<String>,
    }

    /// Exit policy that records every outcome, then delegates.
    ///
    /// Clones share the same record list, so a clone can be registered on a
    /// route while the test keeps the original.
    ///
    /// # Example
    ///
    /// ```
    /// use composable_http_testing::mocks::RecordingExitPolicy;
    ///
    /// let policy = RecordingExitPolicy::new();
    /// assert!(policy.is_empty());
    /// ```
    #[derive(Debug, Clone)]
    pub struct RecordingExitPolicy<P = ForwardErrors> {
        records: Arc<Mutex<Vec<ExitRecord>>>,
        inner: P,
    }

    impl RecordingExitPolicy {
        /// Record, then forward failures like the default policy.
        #[must_use]
        pub fn new() -> Self {
            Self::wrapping(ForwardErrors)
        }

        /// Record, then do nothing.
        #[must_use]
        pub fn silent() -> RecordingExitPolicy<Silent> {
            RecordingExitPolicy::wrapping(Silent)
        }
    }

    impl Default for RecordingExitPolicy {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<P> RecordingExitPolicy<P> {
        /// Record, then apply `inner`.
        #[must_use]
        pub fn wrapping(inner: P) -> Self {
            Self {
                records: Arc::new(Mutex::new(Vec::new())),
                inner,
            }
        }

        /// Everything recorded so far, in invocation order.
        #[must_use]
        pub fn records(&self) -> Vec<ExitRecord> {
            lock(&self.records).clone()
        }

        /// Number of invocations.
        #[must_use]
        pub fn len(&self) -> usize {
            lock(&self.records).len()
        }

        /// Whether the policy was never invoked.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            lock(&self.records).is_empty()
        }

        /// Number of invocations with the given outcome label.
        #[must_use]
        pub fn count(&self, outcome: &str) -> usize {
            lock(&self.records)
                .iter()
                .filter(|r| r.outcome == outcome)
                .count()
        }
    }

    impl<E, P> ExitPolicy<E> for RecordingExitPolicy<P>
    where
        E: Display,
        P: ExitPolicy<E>,
    {
        fn on_exit(&self, outcome: Outcome<E>, context: &RequestContext) {
            let request = context.request();
            let record = ExitRecord {
                method: request.method().to_string(),
                path: request.original_path().to_string(),
                outcome: composable_http_core::outcome::outcome_label(&outcome),
                message: outcome.as_ref().err().map(ToString::to_string),
            };
            lock(&self.records).push(record);
            self.inner.on_exit(outcome, context);
        }
    }

    /// Records what the context registry returns from inside handlers.
    ///
    /// A handler calls [`observe`](Self::observe) with the path it was
    /// dispatched for; the probe pairs it with the path of the ambiently
    /// retrieved context. Any pair that differs means a context leaked
    /// between requests.
    #[derive(Debug, Clone, Default)]
    pub struct ContextProbe {
        seen: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl ContextProbe {
        /// Empty probe.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Record the bound context's path next to `expected`.
        ///
        /// # Errors
        ///
        /// Returns [`ContextError::Unavailable`] outside a binding.
        pub fn observe(&self, expected: &str) -> Result<(), ContextError> {
            let bound = context::retrieve()?;
            lock(&self.seen).push((
                expected.to_string(),
                bound.request().original_path().to_string(),
            ));
            Ok(())
        }

        /// Number of observations.
        #[must_use]
        pub fn len(&self) -> usize {
            lock(&self.seen).len()
        }

        /// Whether nothing was observed.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            lock(&self.seen).is_empty()
        }

        /// Observations where the retrieved context was not the expected one.
        #[must_use]
        pub fn mismatches(&self) -> Vec<(String, String)> {
            lock(&self.seen)
                .iter()
                .filter(|(expected, seen)| expected != seen)
                .cloned()
                .collect()
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    /// Install a `tracing` subscriber writing to the test output.
    ///
    /// Honors `RUST_LOG`; safe to call from every test.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// A parameter name: an identifier of up to eight characters.
    pub fn param_name() -> impl Strategy<Value = String> {
        "[a-z][a-zA-Z0-9_]{0,7}"
    }

    /// A literal path segment.
    pub fn literal_segment() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,8}"
    }

    /// A value that can stand in a path segment without escaping.
    pub fn param_value() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_-]{1,12}"
    }

    /// A pattern with up to `max` distinct parameters after a literal head,
    /// together with its parameter names in order.
    pub fn pattern_with_params(max: usize) -> impl Strategy<Value = (String, Vec<String>)> {
        (
            literal_segment(),
            proptest::collection::btree_set(param_name(), 0..=max),
        )
            .prop_map(|(head, names)| {
                let names: Vec<String> = names.into_iter().collect();
                let mut pattern = format!("/{head}");
                for name in &names {
                    pattern.push_str("/:");
                    pattern.push_str(name);
                }
                (pattern, names)
            })
    }
}

// Re-export commonly used items
pub use helpers::init_test_tracing;
pub use mocks::{ContextProbe, ExitRecord, RecordingExitPolicy};
pub use request_test::{RequestTest, TestResponse, send};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use bytes::Bytes;
    use composable_http_core::Failure;
    use composable_http_runtime::{ExitPolicy, Next, Request, RequestContext, Response};
    use proptest::prelude::*;

    fn context() -> RequestContext {
        let request = Request::from_http(
            http::Request::builder().uri("/probe").body(Bytes::new()).unwrap(),
        );
        RequestContext::new(request, Response::new(), Next::new())
    }

    #[test]
    fn test_recording_policy_shares_records_between_clones() {
        let policy = RecordingExitPolicy::silent();
        let registered = policy.clone();
        registered.on_exit(Ok::<(), Failure<String>>(()), &context());
        registered.on_exit(Err(Failure::Handler("nope".to_string())), &context());

        assert_eq!(policy.len(), 2);
        assert_eq!(policy.count("ok"), 1);
        let failed = &policy.records()[1];
        assert_eq!(failed.path, "/probe");
        assert_eq!(failed.message.as_deref(), Some("nope"));
    }

    #[test]
    fn test_recording_policy_forwards_by_default() {
        let policy = RecordingExitPolicy::new();
        let ctx = context();
        policy.on_exit(Err(Failure::Handler("nope".to_string())), &ctx);
        assert!(ctx.next().is_signalled());
    }

    #[tokio::test]
    async fn test_probe_outside_binding() {
        let probe = ContextProbe::new();
        assert!(probe.observe("/x").is_err());
        assert!(probe.is_empty());
    }

    #[tokio::test]
    async fn test_probe_detects_mismatch() {
        let probe = ContextProbe::new();
        composable_http_runtime::context::bind(context(), async {
            probe.observe("/probe").unwrap();
            probe.observe("/other").unwrap();
        })
        .await;
        assert_eq!(probe.len(), 2);
        assert_eq!(
            probe.mismatches(),
            vec![("/other".to_string(), "/probe".to_string())]
        );
    }

    proptest! {
        #[test]
        fn prop_generated_patterns_have_distinct_names((pattern, names) in properties::pattern_with_params(4)) {
            let parsed = composable_http_core::path::param_names(&pattern).unwrap();
            prop_assert_eq!(parsed.to_vec(), names);
        }
    }
}
