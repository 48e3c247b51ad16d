//! Error types of the integration core.

use thiserror::Error;

/// Result alias used by the integration core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while setting up or running an integration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The request was rejected before the solver was invoked.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The solver could not reach the end of the time span.
    #[error("integration failed at t = {t}: {reason}")]
    IntegrationFailure {
        /// Time reached when the solver gave up.
        t: f64,
        /// Why the solver gave up.
        reason: String,
    },
}

impl Error {
    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub(crate) fn integration_failure(t: f64, reason: impl Into<String>) -> Self {
        Self::IntegrationFailure {
            t,
            reason: reason.into(),
        }
    }
}
