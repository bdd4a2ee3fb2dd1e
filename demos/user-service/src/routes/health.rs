//! Health endpoints.
//!
//! - `GET /` is a classic handler: no context, no outcome.
//! - `GET /ready` is an effect handler that waits on the health probe.

use crate::adapters::HasHealth;
use composable_http_runtime::prelude::*;
use std::convert::Infallible;

/// Body of the liveness check.
pub const HEALTHY: &str = "All is good in the hood";

/// Health router, meant to be mounted at `/health`.
#[must_use]
pub fn health_router<Env>() -> Pipeline<Env>
where
    Env: HasHealth + Send + Sync + 'static,
{
    Pipeline::router()
        .classic(
            Method::Get,
            "/",
            [native::sync_handler(|_req, res, _next| res.send(HEALTHY))],
        )
        .get("/ready", ready::<Env>)
}

async fn ready<Env: HasHealth>(cx: HandlerContext<Env>) -> Result<(), Infallible> {
    cx.env().health().health().await;
    cx.response().send("ready");
    Ok(())
}
