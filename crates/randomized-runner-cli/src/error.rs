//! Error types for the CLI

use randomized_runner::RunnerError;
use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Suite name not present in the catalog
    #[error("Unknown suite: {name}")]
    UnknownSuite {
        /// Requested name
        name: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Event serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Runner library error
    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an unknown suite error
    #[must_use]
    pub fn unknown_suite(name: impl Into<String>) -> Self {
        Self::UnknownSuite { name: name.into() }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = CliError::config("bad config");
        assert!(err.to_string().contains("Configuration"));
        assert!(err.to_string().contains("bad config"));
    }

    #[test]
    fn test_unknown_suite_error() {
        let err = CliError::unknown_suite("NoSuchSuite");
        assert_eq!(err.to_string(), "Unknown suite: NoSuchSuite");
    }

    #[test]
    fn test_invalid_argument_error() {
        let err = CliError::invalid_argument("bad arg");
        assert!(err.to_string().contains("Invalid argument"));
    }

    #[test]
    fn test_runner_error_from() {
        let cli_err: CliError = RunnerError::config("bad seed").into();
        assert!(cli_err.to_string().contains("bad seed"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err: CliError = io_err.into();
        assert!(cli_err.to_string().contains("I/O"));
    }
}
