//! Long-running remote jobs
//!
//! A job is started by submitting an [`Artifact`] to a [`RemoteJobService`],
//! which answers with a [`JobHandle`]. The handle is persisted in a
//! [`HandleStore`] under a caller-chosen key before anything else happens, so
//! a restarted process can pick the job up again. [`JobOrchestrator`] ties
//! these together.

mod orchestrator;
mod service;
mod store;
mod types;

pub use orchestrator::{JobOrchestrator, OrchestratorConfig};
pub use service::{RemoteJobService, ServiceError};
pub use store::{FileHandleStore, HandleStore, MemoryHandleStore};
pub use types::{Artifact, JobHandle, JobStatus, ResultIdentifier};

#[cfg(test)]
pub use store::MockHandleStore;
