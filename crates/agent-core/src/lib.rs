//! Core abstractions for agent-rs
//!
//! Two pieces live here:
//!
//! - [`BackoffInvoker`] retries a single remote call with bounded exponential
//!   backoff, using the [`Classify`] trait to tell transient failures from
//!   fatal ones.
//! - [`JobOrchestrator`] drives a long-running remote job from submission to a
//!   terminal state, persisting the job handle in a [`HandleStore`] so that a
//!   restarted process resumes monitoring instead of resubmitting.

pub mod error;
pub mod jobs;
pub mod retry;

pub use error::{Error, Result};
pub use jobs::{
    Artifact, FileHandleStore, HandleStore, JobHandle, JobOrchestrator, JobStatus,
    MemoryHandleStore, OrchestratorConfig, RemoteJobService, ResultIdentifier, ServiceError,
};
pub use retry::{BackoffInvoker, Classify, ErrorKind, RetryError, RetryPolicy};
pub use tokio_util::sync::CancellationToken;
