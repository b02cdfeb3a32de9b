//! Error types for risk engine

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single problem with one transaction field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name as it appears on the wire
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

impl FieldError {
    /// Create new field error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Every field problem found on one input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    /// Field-level detail
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Record a problem
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// True when no problem was recorded
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert into a `Result`, failing when anything was recorded
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Risk engine error
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing transaction fields
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Two rule definitions share an id
    #[error("Duplicate rule id: {0}")]
    DuplicateRule(String),

    /// Weight or lookup refers to a rule the registry does not know
    #[error("Unknown rule id: {0}")]
    UnknownRule(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// External store or service failed
    #[error("Dependency {dependency} failed: {message}")]
    Dependency {
        /// Dependency name (cache, velocity, consortium, ml, ...)
        dependency: &'static str,
        /// Failure detail
        message: String,
    },

    /// External store or service did not answer in time
    #[error("Dependency {dependency} timed out after {ms}ms")]
    Timeout {
        /// Dependency name
        dependency: &'static str,
        /// Budget that elapsed
        ms: u64,
    },

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Background worker is gone
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

impl Error {
    /// Build a dependency error
    pub fn dependency(dependency: &'static str, message: impl fmt::Display) -> Self {
        Error::Dependency {
            dependency,
            message: message.to_string(),
        }
    }

    /// Only malformed input is reported back to the caller; every other
    /// class is absorbed into a degraded but complete assessment.
    pub fn is_caller_visible(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Transient failure worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Dependency { .. } | Error::Timeout { .. })
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::DuplicateRule(_) => "DUPLICATE_RULE",
            Error::UnknownRule(_) => "UNKNOWN_RULE",
            Error::Config(_) => "CONFIGURATION_ERROR",
            Error::Dependency { .. } => "DEPENDENCY_ERROR",
            Error::Timeout { .. } => "DEPENDENCY_TIMEOUT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::ChannelClosed(_) => "UNAVAILABLE",
        }
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_collect() {
        let mut errors = ValidationErrors::default();
        assert!(errors.clone().into_result().is_ok());

        errors.push("amount", "must be positive");
        errors.push("currency", "must be a 3-letter code");

        let err = errors.into_result().unwrap_err();
        assert!(err.is_caller_visible());
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(
            err.to_string(),
            "Validation failed: amount: must be positive; currency: must be a 3-letter code"
        );
    }

    #[test]
    fn test_dependency_errors_are_absorbed() {
        let err = Error::dependency("velocity", "connection refused");
        assert!(!err.is_caller_visible());
        assert_eq!(err.to_string(), "Dependency velocity failed: connection refused");

        assert!(err.is_retryable());

        let err = Error::Timeout { dependency: "cache", ms: 15 };
        assert!(!err.is_caller_visible());
        assert!(err.is_retryable());
        assert!(!Error::Config("bad".to_string()).is_retryable());
        assert_eq!(err.code(), "DEPENDENCY_TIMEOUT");
    }
}
