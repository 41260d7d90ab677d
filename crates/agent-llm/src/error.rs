//! Error types for LLM operations

use agent_core::{Classify, ErrorKind, ServiceError};
use thiserror::Error;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Error, Debug)]
pub enum LLMError {
    /// API request failed
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Server-side failure (HTTP 5xx)
    #[error("Server error (HTTP {status}): {body}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Invalid API key or authentication failed
    #[error("Invalid API key or authentication failed")]
    AuthenticationFailed,

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Other resource (file, job) not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Local I/O error, e.g. reading a training file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected response format
    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl Classify for LLMError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthenticationFailed
            | Self::InvalidRequest(_)
            | Self::ModelNotFound(_)
            | Self::NotFound(_)
            | Self::SerializationError(_)
            | Self::Io(_)
            | Self::ConfigurationError(_) => ErrorKind::Fatal,
            Self::RequestFailed(_)
            | Self::ServerError { .. }
            | Self::RateLimitExceeded(_)
            | Self::HttpError(_)
            | Self::UnexpectedResponse(_) => ErrorKind::Retryable,
        }
    }
}

impl From<LLMError> for ServiceError {
    fn from(err: LLMError) -> Self {
        ServiceError::new(err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(LLMError::RateLimitExceeded("slow down".to_string()).is_retryable());
        assert!(
            LLMError::ServerError {
                status: 503,
                body: "overloaded".to_string()
            }
            .is_retryable()
        );
        assert!(LLMError::RequestFailed("HTTP 409".to_string()).is_retryable());
        assert!(LLMError::UnexpectedResponse("truncated".to_string()).is_retryable());
    }

    #[test]
    fn test_request_errors_are_fatal() {
        assert_eq!(LLMError::AuthenticationFailed.kind(), ErrorKind::Fatal);
        assert_eq!(
            LLMError::InvalidRequest("bad".to_string()).kind(),
            ErrorKind::Fatal
        );
        assert_eq!(
            LLMError::ModelNotFound("gpt-5".to_string()).kind(),
            ErrorKind::Fatal
        );
        assert_eq!(
            LLMError::ConfigurationError("no key".to_string()).kind(),
            ErrorKind::Fatal
        );
        assert_eq!(
            LLMError::Io(std::io::Error::other("missing file")).kind(),
            ErrorKind::Fatal
        );
    }

    #[test]
    fn test_service_error_keeps_kind() {
        let err: ServiceError = LLMError::RateLimitExceeded("429".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Retryable);
        assert!(err.message().contains("Rate limit"));

        let err: ServiceError = LLMError::AuthenticationFailed.into();
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }
}
