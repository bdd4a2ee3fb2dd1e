//! User lookup.
//!
//! `GET /:id` reads the users file and answers with the record stored under
//! `id`. The record is serialized to a JSON string and that string is sent as
//! the JSON body, so clients receive a quoted, escaped document. Existing
//! clients parse it that way; keep it.

use crate::adapters::{HasFiles, USERS_FILE};
use composable_http_runtime::prelude::*;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use serde_json::{Map, Value};
use thiserror::Error;

/// Id that reads a file which does not exist.
pub const FAILING_ID: &str = "fail";

/// Path parameters of the lookup route.
#[derive(PathParams, Debug, Clone)]
pub struct UserParams {
    /// User id
    pub id: String,
}

/// Lookup failures that are not a missing record.
#[derive(Error, Debug)]
pub enum UserRouteError {
    /// The users file is not a JSON object of records.
    #[error("users file is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// User router with the default outcome logging, meant to be mounted at `/user`.
#[must_use]
pub fn user_router<Env>() -> Pipeline<Env>
where
    Env: HasFiles + Send + Sync + 'static,
{
    user_router_with(Traced::new(ForwardErrors))
}

/// User router whose lookup route uses `policy`.
#[must_use]
pub fn user_router_with<Env, X>(policy: X) -> Pipeline<Env>
where
    Env: HasFiles + Send + Sync + 'static,
    X: ExitPolicy<BoxError>,
{
    Pipeline::router()
        .route_typed_with(Method::Get, "/:id", read_user::<Env>, policy)
        .inspect_build_err(|err| tracing::error!(error = %err, "Caught an error"))
}

/// [`user_router`] paired with its mount path.
#[must_use]
pub fn scoped_user_router<Env>() -> Scoped<Env>
where
    Env: HasFiles + Send + Sync + 'static,
{
    user_router().scoped("/user")
}

async fn read_user<Env: HasFiles>(
    cx: HandlerContext<Env>,
    params: UserParams,
) -> Result<(), UserRouteError> {
    let file = if params.id == FAILING_ID {
        FAILING_ID
    } else {
        USERS_FILE
    };

    let raw = match cx.env().files().read(file).await {
        Ok(raw) => raw,
        Err(err) => {
            tracing::debug!(id = %params.id, error = %err, "user store unavailable");
            not_found(cx.response());
            return Ok(());
        },
    };

    let users: Map<String, Value> = serde_json::from_str(&raw)?;
    match users.get(&params.id) {
        Some(user) => {
            let encoded = serde_json::to_string(user)?;
            cx.response()
                .status(StatusCode::OK)
                .set_header(CONTENT_TYPE, "application/json")
                .json(&encoded)?;
        },
        None => not_found(cx.response()),
    }
    Ok(())
}

fn not_found(response: &Response) {
    response.status(StatusCode::NOT_FOUND).send("Not found");
}
