//! # Composable HTTP Runtime
//!
//! Runtime for composable HTTP pipelines.
//!
//! This crate turns the continuation-passing `(request, response, next)`
//! handler model into a typed, async pipeline with explicit outcomes.
//!
//! ## Core Components
//!
//! - **Native host** ([`native`], [`table`]): requests, shared responses, one-shot
//!   continuations and the ordered routing table that dispatches them
//! - **Context registry** ([`context`]): binds the request context for the
//!   duration of one handler execution
//! - **Handler adapter** ([`adapter`]): runs a handler to settlement, turns the
//!   result into an [`Outcome`] and hands it to an [`ExitPolicy`]
//! - **Pipeline** ([`pipeline`]): deferred app/router descriptions and their
//!   combinators
//!
//! ## Example
//!
//! ```ignore
//! use composable_http_runtime::prelude::*;
//!
//! let app = Pipeline::app()
//!     .get("/user/:id", |cx: HandlerContext<Env>| async move {
//!         let id = cx.params().require("id")?;
//!         cx.response().send(format!("user {id}"));
//!         Ok::<_, BoxError>(())
//!     })
//!     .build(Arc::new(env))
//!     .await?;
//! ```

// Lets `#[derive(PathParams)]` name this crate from inside it.
extern crate self as composable_http_runtime;

/// Handler adapter and exit policies
pub mod adapter;

/// Request-scoped context registry
pub mod context;

/// Pipeline build errors
pub mod error;

/// Native request/response/continuation model
pub mod native;

/// Pipeline values and composition combinators
pub mod pipeline;

/// Routing table and dispatcher
pub mod table;

pub use adapter::{ExitPolicy, ForwardErrors, Handler, HandlerContext, Silent, Traced};
pub use composable_http_core::{
    BoxError, ConstructionError, ContextError, Failure, HttpError, Method, Outcome, Params,
    PathParams,
};
pub use composable_http_macros::PathParams;

// Derive output refers to core items through this path.
#[doc(hidden)]
pub use composable_http_core as __core;
pub use context::{RequestContext, RouteContext};
pub use error::BuildError;
pub use native::{ErrorHandler, NativeHandler, Next, Request, Response};
pub use pipeline::{App, Artifact, ArtifactKind, Pipeline, Router, RouterOptions, Scoped};
pub use table::{RouteEntry, RoutingTable};

/// Everything needed to write and compose handlers.
pub mod prelude {
    pub use crate::adapter::{ExitPolicy, ForwardErrors, HandlerContext, Silent, Traced};
    pub use crate::context;
    pub use crate::native::{self, Next, Request, Response};
    pub use crate::pipeline::{App, Artifact, Pipeline, RouterOptions, Scoped};
    pub use crate::{BoxError, HttpError, Method, Outcome, PathParams, RequestContext};
    pub use std::sync::Arc;
}
