//! # Composable HTTP Core
//!
//! Core types shared by every layer of the composable HTTP stack.
//!
//! This crate holds the pure, I/O-free vocabulary the runtime is built from:
//!
//! - **Method**: every verb a route can be registered for (including the
//!   WebDAV-style verbs and the `All` wildcard)
//! - **`PathPattern`**: `:name` segment patterns, parameter extraction and matching
//! - **Params / `PathParams`**: the per-request parameter map and its typed view
//! - **Outcome / Failure**: the settled result of running a handler pipeline
//! - **Errors**: construction, context and HTTP error types
//!
//! ## Example
//!
//! ```
//! use composable_http_core::path::PathPattern;
//!
//! let pattern = PathPattern::parse("/user/:id").unwrap();
//! assert_eq!(pattern.param_names(), ["id"]);
//!
//! let params = pattern.match_exact("/user/42", Default::default()).unwrap();
//! assert_eq!(params.get("id"), Some("42"));
//! ```

pub mod error;
pub mod method;
pub mod outcome;
pub mod params;
pub mod path;

pub use error::{BoxError, ConstructionError, ContextError, HttpError};
pub use method::Method;
pub use outcome::{Failure, Outcome};
pub use params::{Params, PathParams};
pub use path::{MatchOptions, PathPattern};

// Re-export for derive output and downstream crates
pub use smallvec::{SmallVec, smallvec};
