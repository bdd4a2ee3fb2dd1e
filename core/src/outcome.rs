//! The settled result of running one handler pipeline.
//!
//! Every dispatched request produces exactly one [`Outcome`]: `Ok(())` when the
//! handler completed normally, `Err(Failure)` when it returned an error or
//! terminated abnormally.

use thiserror::Error;

/// `Right(unit)` on success, `Left(failure)` otherwise.
pub type Outcome<E> = Result<(), Failure<E>>;

/// Why a handler pipeline did not complete normally.
#[derive(Error, Debug)]
pub enum Failure<E> {
    /// The handler returned an error value.
    #[error(transparent)]
    Handler(E),

    /// The handler panicked; the payload message is kept when it was a string.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl<E> Failure<E> {
    /// The handler's own error, if this failure carries one.
    #[must_use]
    pub const fn as_handler(&self) -> Option<&E> {
        match self {
            Self::Handler(e) => Some(e),
            Self::Panicked(_) => None,
        }
    }

    /// Whether the handler panicked.
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    /// Short label used for logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Handler(_) => "error",
            Self::Panicked(_) => "panic",
        }
    }

    /// Build a failure from a caught panic payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "<non-string panic payload>".to_string());
        Self::Panicked(message)
    }
}

/// Label of a settled outcome (`ok`, `error`, `panic`).
#[must_use]
pub const fn outcome_label<E>(outcome: &Outcome<E>) -> &'static str {
    match outcome {
        Ok(()) => "ok",
        Err(failure) => failure.label(),
    }
}
