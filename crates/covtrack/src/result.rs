//! Result and error types for Covtrack.

use thiserror::Error;

/// Result type for Covtrack operations
pub type CovResult<T> = Result<T, CovError>;

/// Errors that can occur in Covtrack
#[derive(Debug, Error)]
pub enum CovError {
    /// Wrong or missing identifiers; the store is left untouched
    #[error("Validation failed: {message}")]
    Validation {
        /// Error message
        message: String,
    },

    /// Source text could not be tokenized or parsed
    #[error("Parse error at line {line}: {message}")]
    Parse {
        /// Line the parser stopped at (1-indexed)
        line: u32,
        /// Error message
        message: String,
    },

    /// Script raised an error while running
    #[error("Runtime error at line {line}: {message}")]
    Runtime {
        /// Line of the failing statement or call
        line: u32,
        /// Error message
        message: String,
    },

    /// Source rewriting failed (always recoverable by falling back)
    #[error("Instrumentation failed: {0}")]
    Instrumentation(#[from] InstrumentError),

    /// Invalid state error (operation called in wrong state)
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl CovError {
    /// Create a validation error
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a parse error
    #[must_use]
    pub fn parse(line: u32, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Create a runtime error
    #[must_use]
    pub fn runtime(line: u32, message: impl Into<String>) -> Self {
        Self::Runtime {
            line,
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

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this is a validation error
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Whether this is a parse error
    #[must_use]
    pub const fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

/// Reasons a file could not be instrumented
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstrumentError {
    /// Source exceeds the hard instrumentation limit
    #[error("file is {size} bytes, limit is {limit} bytes")]
    FileTooLarge {
        /// Source size in bytes
        size: usize,
        /// Configured hard limit
        limit: usize,
    },

    /// Rewritten source does not parse back, or shifted line numbers
    #[error("rewritten source is invalid: {message}")]
    Reparse {
        /// Error message
        message: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = CovError::validation("file id 7 is not registered");
        assert!(err.is_validation());
        assert!(err.to_string().contains("Validation"));
        assert!(err.to_string().contains("file id 7"));
    }

    #[test]
    fn test_parse_error_carries_line() {
        let err = CovError::parse(12, "expected 'end'");
        assert!(err.is_parse());
        assert_eq!(err.to_string(), "Parse error at line 12: expected 'end'");
    }

    #[test]
    fn test_instrument_error_from() {
        let err: CovError = InstrumentError::FileTooLarge { size: 10, limit: 5 }.into();
        assert!(err.to_string().contains("10 bytes"));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.lua");
        let err: CovError = io_err.into();
        assert!(err.to_string().contains("I/O"));
    }
}
