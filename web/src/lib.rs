//! Axum integration for composable HTTP pipelines.
//!
//! The runtime crate owns routing, context binding and outcomes; this crate
//! puts a built [`App`](composable_http_runtime::App) on the network.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Protocol shell (axum/hyper)      │  ← parsing, keep-alive, TLS
//! │  - TraceLayer, correlation IDs          │
//! │  - body collection, size limit          │
//! ├─────────────────────────────────────────┤
//! │        Native host (runtime)            │
//! │  - ordered layers, first match wins     │  ← request, response, next
//! │  - error chain and final handler        │
//! ├─────────────────────────────────────────┤
//! │        Effect handlers                  │
//! │  - bound request context                │  ← outcome → exit policy
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use composable_http_web::{listen, ServerConfig};
//!
//! let config = ServerConfig::from_env();
//! listen(app_pipeline, Arc::new(env), &config).await?;
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod middleware;
pub mod server;

// Re-export key types for convenience
pub use bridge::{dispatch, into_router};
pub use config::ServerConfig;
pub use error::ServeError;
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId, CorrelationIdExt, correlation_id_layer};
pub use server::{listen, serve, shutdown_signal};
