//! Collaborators the routes depend on, and the capability traits that expose
//! them to handlers.
//!
//! Both traits return boxed futures so they can be used as trait objects
//! (`Arc<dyn FileAdapter>`) inside the service environment.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Boxed future returned by adapter methods.
pub type AdapterFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// File holding every user record, keyed by id.
pub const USERS_FILE: &str = "users";

/// Backing store failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No file under this key.
    #[error("File not found: {0}")]
    NotFound(String),
}

/// Read-only keyed text store.
pub trait FileAdapter: Send + Sync {
    /// Contents of the file stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if nothing is stored under `key`.
    fn read<'a>(&'a self, key: &'a str) -> AdapterFuture<'a, Result<String, StoreError>>;
}

/// Readiness probe. Always succeeds.
pub trait HealthAdapter: Send + Sync {
    /// Resolve once the service is ready.
    fn health(&self) -> AdapterFuture<'_, ()>;
}

/// [`FileAdapter`] over a fixed in-memory map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFileAdapter {
    files: HashMap<String, String>,
}

impl InMemoryFileAdapter {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The store the service ships with: one user, `0`.
    #[must_use]
    pub fn seeded() -> Self {
        let users = serde_json::json!({
            "0": { "name": "juan", "last": "gomez" }
        });
        Self::new().with_file(USERS_FILE, users.to_string())
    }

    /// Store `contents` under `key`.
    #[must_use]
    pub fn with_file(mut self, key: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.insert(key.into(), contents.into());
        self
    }
}

impl FileAdapter for InMemoryFileAdapter {
    fn read<'a>(&'a self, key: &'a str) -> AdapterFuture<'a, Result<String, StoreError>> {
        Box::pin(async move {
            self.files
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(key.to_string()))
        })
    }
}

/// [`HealthAdapter`] that is always ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysHealthy;

impl HealthAdapter for AlwaysHealthy {
    fn health(&self) -> AdapterFuture<'_, ()> {
        Box::pin(std::future::ready(()))
    }
}

/// Capability: a file store.
pub trait HasFiles {
    /// The file store.
    fn files(&self) -> &dyn FileAdapter;
}

/// Capability: a readiness probe.
pub trait HasHealth {
    /// The readiness probe.
    fn health(&self) -> &dyn HealthAdapter;
}

/// The service's capability set.
#[derive(Clone)]
pub struct ServiceEnv {
    files: Arc<dyn FileAdapter>,
    health: Arc<dyn HealthAdapter>,
}

impl ServiceEnv {
    /// Assemble an environment from its collaborators.
    #[must_use]
    pub fn new(files: Arc<dyn FileAdapter>, health: Arc<dyn HealthAdapter>) -> Self {
        Self { files, health }
    }

    /// Production collaborators: the seeded store and an always-ready probe.
    #[must_use]
    pub fn live() -> Self {
        Self::new(Arc::new(InMemoryFileAdapter::seeded()), Arc::new(AlwaysHealthy))
    }
}

impl std::fmt::Debug for ServiceEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceEnv").finish_non_exhaustive()
    }
}

impl HasFiles for ServiceEnv {
    fn files(&self) -> &dyn FileAdapter {
        self.files.as_ref()
    }
}

impl HasHealth for ServiceEnv {
    fn health(&self) -> &dyn HealthAdapter {
        self.health.as_ref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeded_store_keeps_field_order() {
        let store = InMemoryFileAdapter::seeded();
        let raw = store.read(USERS_FILE).await.unwrap();
        assert_eq!(raw, r#"{"0":{"name":"juan","last":"gomez"}}"#);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let store = InMemoryFileAdapter::seeded();
        assert_eq!(
            store.read("fail").await,
            Err(StoreError::NotFound("fail".to_string()))
        );
    }

    #[tokio::test]
    async fn test_live_env_is_healthy() {
        let env = ServiceEnv::live();
        env.health().health().await;
        assert!(env.files().read(USERS_FILE).await.is_ok());
    }
}
