//! Result and error types for the runner.
//!
//! These are infrastructure errors: a suite that cannot be configured or
//! validated never gets to run. Failures *inside* a running suite travel as
//! [`Throwable`](crate::Throwable) values through the notifier instead.

use thiserror::Error;

/// Result type for runner operations
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that prevent a suite from being constructed or run
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Malformed seed chain, conflicting annotations, bad property values
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Suite or method shape violates the lifecycle contract
    #[error("Validation error: {message}")]
    Validation {
        /// Error message
        message: String,
    },

    /// Operation called in the wrong state (e.g. outside a runner context)
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// Argument outside the accepted domain (empty pick list, inverted range)
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// Thread spawn or other OS-level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RunnerError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Whether this error stems from configuration rather than suite shape
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}
