//! Remote job service abstraction

use super::types::{Artifact, JobHandle, JobStatus};
use crate::retry::{Classify, ErrorKind};
use async_trait::async_trait;
use thiserror::Error;

/// Error reported by a [`RemoteJobService`]
///
/// Implementations classify their native errors when converting, so the
/// orchestrator only needs to know whether a retry makes sense.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ServiceError {
    kind: ErrorKind,
    message: String,
}

impl ServiceError {
    /// Create an error with an explicit kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Transient failure
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Retryable, message)
    }

    /// Failure that will not go away on retry
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    /// Error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Classify for ServiceError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Service that runs long asynchronous jobs
///
/// An invalid or expired handle must be reported as [`JobStatus::Unknown`]
/// rather than as an error; the orchestrator then submits a new job.
#[async_trait]
pub trait RemoteJobService: Send + Sync {
    /// Start a job for `artifact` and return its handle
    async fn submit(&self, artifact: &Artifact) -> Result<JobHandle, ServiceError>;

    /// Query the current status of a job
    async fn status(&self, handle: &JobHandle) -> Result<JobStatus, ServiceError>;
}
