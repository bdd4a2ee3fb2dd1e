//! Errors raised while serving an app.

use composable_http_runtime::BuildError;
use thiserror::Error;

/// Why [`listen`](crate::listen) or [`serve`](crate::serve) stopped.
#[derive(Error, Debug)]
pub enum ServeError {
    /// The pipeline failed to build; nothing was bound.
    #[error("Failed to build application: {0}")]
    Build(#[from] BuildError),

    /// Only an app pipeline can be served.
    #[error("Pipeline produced a router; only an app can be served")]
    NotAnApp,

    /// The listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The server loop failed.
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),

    /// In-flight requests did not drain within the shutdown timeout.
    #[error("Shutdown timed out after {0}s with requests still in flight")]
    ShutdownTimeout(u64),
}
