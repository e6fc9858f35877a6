//! Errors raised by provider backends.

use std::time::Duration;

use thiserror::Error;

/// Failure of a provider call or provider setup.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Unknown backend name, missing credentials, or a bad client setting.
    /// Never retried.
    #[error("Provider configuration error: {0}")]
    Configuration(String),

    /// The backend rejected the request (4xx other than 429).
    #[error("{provider} rejected request ({status}): {message}")]
    Rejected {
        provider: String,
        status: u16,
        message: String,
    },

    /// Network failure, rate limit, or server error. Safe to retry.
    #[error("{provider} call failed: {message}")]
    Transient { provider: String, message: String },

    /// The call did not finish within its deadline. Safe to retry.
    #[error("{provider} {operation} timed out after {after:?}")]
    Timeout {
        provider: String,
        operation: String,
        after: Duration,
    },

    /// The backend answered with something we could not interpret.
    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    /// A vector's size differs from the collection's fixed size.
    #[error("Dimension mismatch for collection {collection}: expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// A vector store operation was attempted outside connect/disconnect.
    #[error("{0} vector store is not connected")]
    NotConnected(String),
}

impl ProviderError {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    pub(crate) fn transient(provider: &str, message: impl Into<String>) -> Self {
        Self::Transient {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_response(provider: &str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}
