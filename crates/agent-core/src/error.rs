//! Error types for agent-core

use crate::jobs::{JobHandle, JobStatus};
use crate::retry::RetryError;
use std::fmt::Display;
use thiserror::Error;

/// Result type alias for agent-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for retry and job orchestration
#[derive(Error, Debug)]
pub enum Error {
    /// A retryable call kept failing until the policy gave up
    #[error("{operation} gave up after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Name of the operation
        operation: String,
        /// Number of attempts made
        attempts: u32,
        /// Last error observed
        last_error: String,
    },

    /// The remote service rejected a call with a non-retryable error
    #[error("{operation} failed: {message}")]
    Remote {
        /// Name of the operation
        operation: String,
        /// Error reported by the service
        message: String,
    },

    /// The remote job reached a terminal failure state
    #[error("Remote job {handle} ended with status {status}")]
    JobFailed {
        /// Handle of the failed job
        handle: JobHandle,
        /// Last status observed
        status: JobStatus,
    },

    /// Cancelled before a result was available; the persisted handle is left untouched
    #[error("Cancelled while waiting for the job stored under '{key}'")]
    Cancelled {
        /// Store key of the job
        key: String,
        /// Handle known at the time, if any
        handle: Option<JobHandle>,
    },

    /// Polling hit the configured attempt cap or deadline
    #[error("Job {handle} still unresolved after {polls} status checks")]
    PollLimitExceeded {
        /// Handle that was being monitored
        handle: JobHandle,
        /// Number of status checks made
        polls: u32,
    },

    /// Retry policy failed validation
    #[error("Invalid retry policy: {0}")]
    InvalidPolicy(String),

    /// Handle persistence failed
    #[error("Handle store error for key '{key}': {message}")]
    Store {
        /// Store key
        key: String,
        /// Description of the failure
        message: String,
    },

    /// Missing credential or identifier
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl<E: Display> From<RetryError<E>> for Error {
    fn from(err: RetryError<E>) -> Self {
        match err {
            RetryError::Exhausted {
                operation,
                attempts,
                last_error,
            } => Self::RetryExhausted {
                operation,
                attempts,
                last_error: last_error.to_string(),
            },
            RetryError::Fatal { operation, error, .. } => Self::Remote {
                operation,
                message: error.to_string(),
            },
        }
    }
}
