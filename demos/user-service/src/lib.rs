//! User service: a small app built from composable HTTP pipelines.
//!
//! - `GET /health` answers from a classic handler
//! - `GET /health/ready` waits on the health probe
//! - `GET /user/:id` looks a user up in the file store
//!
//! # Architecture
//!
//! ```text
//! app
//! ├── /health   health_router   (Env: HasHealth)
//! └── /user     user_router     (Env: HasFiles)
//! ```
//!
//! The app requires both capabilities; [`ServiceEnv`] provides them.

pub mod adapters;
pub mod config;
pub mod routes;

pub use adapters::{
    AlwaysHealthy, FileAdapter, HasFiles, HasHealth, HealthAdapter, InMemoryFileAdapter,
    ServiceEnv, StoreError,
};
pub use config::Config;

use composable_http_runtime::Pipeline;

/// The full application.
#[must_use]
pub fn app<Env>() -> Pipeline<Env>
where
    Env: HasFiles + HasHealth + Send + Sync + 'static,
{
    Pipeline::app()
        .mount("/health", routes::health_router())
        .mount_scoped(routes::scoped_user_router())
}
