//! Error types shared across the stack.
//!
//! - [`ConstructionError`]: a route could not be registered (fatal at startup)
//! - [`ContextError`]: the ambient request context was not available
//! - [`HttpError`]: a failure that carries the HTTP status it should render as

use http::StatusCode;
use std::fmt;
use thiserror::Error;

/// Type-erased error crossing the continuation boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors detected while turning route descriptors into a routing table.
///
/// These are raised when a pipeline is built, before any request is served.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    /// The same parameter name appears twice in one pattern.
    #[error("duplicate path parameter `{name}` in pattern `{pattern}`")]
    DuplicateParam {
        /// Offending pattern
        pattern: String,
        /// Repeated parameter name
        name: String,
    },

    /// A `:` is not followed by a parameter name.
    #[error("empty path parameter name in pattern `{pattern}`")]
    EmptyParamName {
        /// Offending pattern
        pattern: String,
    },

    /// Patterns must be absolute.
    #[error("path pattern `{pattern}` must start with `/`")]
    MissingLeadingSlash {
        /// Offending pattern
        pattern: String,
    },

    /// A typed route's parameter struct does not match the pattern.
    #[error("pattern `{pattern}` declares parameters {found:?} but the handler expects {expected:?}")]
    ParamMismatch {
        /// Offending pattern
        pattern: String,
        /// Names declared by the typed parameter struct
        expected: Vec<String>,
        /// Names found in the pattern
        found: Vec<String>,
    },
}

/// Errors raised by the ambient context accessors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// `retrieve` was called outside any request binding.
    #[error("request context unavailable: not inside a bound handler")]
    Unavailable,

    /// Typed retrieval found a parameter missing from the request.
    #[error("path parameter `{0}` missing from request context")]
    MissingParam(String),
}

/// An error that knows how it should be rendered.
///
/// When one of these reaches the final error handler, its status and message
/// are used for the response instead of a generic 500.
///
/// # Examples
///
/// ```
/// use composable_http_core::HttpError;
///
/// let err = HttpError::not_found("User", "123");
/// assert_eq!(err.status().as_u16(), 404);
/// assert_eq!(err.to_string(), "[NOT_FOUND] User with id 123 not found");
/// ```
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    code: String,
    source: Option<BoxError>,
}

impl HttpError {
    /// Create a new HTTP error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Attach the underlying cause (logged, never rendered).
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "BAD_REQUEST".to_string())
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND".to_string(),
        )
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }

    /// Status this error renders as.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// User-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HttpError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn test_not_found() {
        let err = HttpError::not_found("User", "123");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "User with id 123 not found");
    }

    #[test]
    fn test_source_is_kept() {
        let cause = std::io::Error::other("disk on fire");
        let err = HttpError::internal("boom").with_source(cause);
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("disk on fire"));
    }

    #[test]
    fn test_construction_error_display() {
        let err = ConstructionError::DuplicateParam {
            pattern: "/:id/:id".to_string(),
            name: "id".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "duplicate path parameter `id` in pattern `/:id/:id`"
        );
    }
}
