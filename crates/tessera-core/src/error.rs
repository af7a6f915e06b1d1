//! Error types for Tessera operations.
//!
//! This module provides the common `Error` type and `Result<T>` alias used
//! across all Tessera crates. Uses `thiserror` for derive macros.
//!
//! Propagation is fail-fast: any variant returned from a sub-search, the
//! embedding resolver or a reranker aborts the whole query. Nothing in
//! Tessera retries locally; [`Error::is_retryable`] exists so callers can
//! drive their own retry policy.

use thiserror::Error;

/// Errors that can occur in Tessera operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed builder or index parameters.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An embedding provider or native engine call failed.
    #[error("Provider error ({source_name}): {message}")]
    Provider {
        /// Name of the collaborator that failed.
        source_name: String,
        /// Message reported by the collaborator, unchanged.
        message: String,
    },

    /// A reranker returned output that breaks the merge contract.
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// Dimension or column mismatch reported by a collaborator.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a provider error attributed to `source_name`.
    pub fn provider(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a contract violation error.
    pub fn contract_violation(msg: impl Into<String>) -> Self {
        Self::ContractViolation(msg.into())
    }

    /// Create a schema error.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns `true` for validation errors.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns `true` for provider errors.
    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }

    /// Returns `true` for contract violations.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::ContractViolation(_))
    }

    /// Returns `true` for schema errors.
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema(_))
    }

    /// Whether a caller-side retry could plausibly succeed.
    ///
    /// Only collaborator failures qualify; everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Io(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using Tessera's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display() {
        let err = Error::validation("limit must be greater than 0");
        assert_eq!(
            err.to_string(),
            "Validation error: limit must be greater than 0"
        );
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_provider_display_and_retryable() {
        let err = Error::provider("openai", "rate limited");
        assert_eq!(err.to_string(), "Provider error (openai): rate limited");
        assert!(err.is_provider());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_inspectors_are_exclusive() {
        let err = Error::contract_violation("missing _relevance_score");
        assert!(err.is_contract_violation());
        assert!(!err.is_validation());
        assert!(!err.is_schema());

        let err = Error::schema("expected dimension 4, got 3");
        assert!(err.is_schema());
        assert!(!err.is_provider());
    }

    #[test]
    fn test_from_serde_json() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_from_io() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_retryable());
    }
}
