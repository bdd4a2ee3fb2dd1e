//! Process bootstrap: execute the pipeline, bind, accept.

use crate::bridge::into_router;
use crate::config::ServerConfig;
use crate::error::ServeError;
use composable_http_runtime::{App, Pipeline};
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Build `pipeline` with `env`, bind the configured address and serve until
/// ctrl-c or SIGTERM.
///
/// Nothing is bound if the build fails.
///
/// # Errors
///
/// Returns [`ServeError::Build`] or [`ServeError::NotAnApp`] before binding,
/// [`ServeError::Bind`] if the address is unavailable, and any error from
/// [`serve`].
pub async fn listen<Env>(
    pipeline: Pipeline<Env>,
    env: Arc<Env>,
    config: &ServerConfig,
) -> Result<(), ServeError>
where
    Env: Send + Sync + 'static,
{
    let app = pipeline
        .build(env)
        .await?
        .into_app()
        .ok_or(ServeError::NotAnApp)?;

    let addr = config.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServeError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!("Listening on port {}", listener.local_addr()?.port());

    serve(app, listener, config, shutdown_signal()).await
}

/// Serve `app` on an already-bound listener until `shutdown` resolves.
///
/// After `shutdown`, in-flight requests get `config.shutdown_timeout()` to
/// finish.
///
/// # Errors
///
/// Returns [`ServeError::Io`] if the server loop fails and
/// [`ServeError::ShutdownTimeout`] if draining takes too long.
pub async fn serve<F>(
    app: App,
    listener: TcpListener,
    config: &ServerConfig,
    shutdown: F,
) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = into_router(app, config);
    let (stopping_tx, mut stopping_rx) = watch::channel(false);

    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.await;
            let _ = stopping_tx.send(true);
        })
        .into_future();

    let timeout = config.shutdown_timeout();
    let deadline = async move {
        if stopping_rx.wait_for(|stopping| *stopping).await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(timeout).await;
    };

    tokio::select! {
        result = server => {
            result?;
            info!("Server stopped");
            Ok(())
        },
        () = deadline => {
            warn!(timeout_secs = config.shutdown_timeout_secs, "Graceful shutdown timed out");
            Err(ServeError::ShutdownTimeout(config.shutdown_timeout_secs))
        },
    }
}

/// Resolves on ctrl-c or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
