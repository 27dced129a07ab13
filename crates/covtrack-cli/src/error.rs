//! Error types for the CLI

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

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Coverage library error
    #[error("Coverage error: {0}")]
    Coverage(#[from] covtrack::CovError),

    /// Bad `--shard` value
    #[error("Shard error: {0}")]
    Shard(#[from] covtrack::ShardParseError),

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// Some scripts failed to load or run; coverage was still recorded
    #[error("{failed} of {total} scripts failed")]
    ScriptFailures {
        /// Failing scripts
        failed: usize,
        /// Scripts attempted
        total: usize,
    },

    /// A worker process could not be started or did not finish cleanly
    #[error("Worker failed: {message}")]
    Worker {
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

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a worker error
    #[must_use]
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }
}
