//! Errors raised while executing a pipeline value.

use composable_http_core::{BoxError, ConstructionError};
use thiserror::Error;

/// Why [`Pipeline::build`](crate::pipeline::Pipeline::build) failed.
///
/// Every variant is fatal to startup: nothing is served from a pipeline that
/// failed to build.
#[derive(Error, Debug)]
pub enum BuildError {
    /// A route pattern was rejected.
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    /// A handler factory registered with `use_effect` failed.
    #[error("Handler factory at `{path}` failed: {source}")]
    Factory {
        /// Mount path of the factory
        path: String,
        /// What the factory returned
        #[source]
        source: BoxError,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn test_construction_error_is_transparent() {
        let err = BuildError::from(ConstructionError::EmptyParamName {
            pattern: "/:".to_string(),
        });
        assert_eq!(err.to_string(), "empty path parameter name in pattern `/:`");
    }

    #[test]
    fn test_factory_error_keeps_source() {
        let err = BuildError::Factory {
            path: "/files".to_string(),
            source: "disk offline".into(),
        };
        assert_eq!(err.to_string(), "Handler factory at `/files` failed: disk offline");
        assert!(std::error::Error::source(&err).is_some());
    }
}
