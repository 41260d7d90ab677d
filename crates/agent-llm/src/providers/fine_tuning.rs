//! Fine-tuning jobs as a [`RemoteJobService`]
//!
//! Submitting uploads the training file and starts a job on the configured
//! base model; the job id becomes the [`JobHandle`] and the trained model name
//! becomes the [`ResultIdentifier`]. An uploaded file is remembered until a
//! job is created from it, so a retried submission does not upload it again.

use super::openai::{FineTuningJob, OpenAIProvider};
use crate::LLMError;
use agent_core::{
    Artifact, JobHandle, JobStatus, RemoteJobService, ResultIdentifier, ServiceError,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Base model fine-tuned when none is configured
pub const DEFAULT_BASE_MODEL: &str = "gpt-4o-mini-2024-07-18";

/// OpenAI fine-tuning exposed to the job orchestrator
pub struct FineTuneJobService {
    provider: Arc<OpenAIProvider>,
    base_model: String,
    uploads: Mutex<HashMap<PathBuf, String>>,
}

impl FineTuneJobService {
    /// Fine-tune [`DEFAULT_BASE_MODEL`] through `provider`
    pub fn new(provider: Arc<OpenAIProvider>) -> Self {
        Self {
            provider,
            base_model: DEFAULT_BASE_MODEL.to_string(),
            uploads: Mutex::new(HashMap::new()),
        }
    }

    /// Fine-tune a different base model
    pub fn with_base_model(mut self, model: impl Into<String>) -> Self {
        self.base_model = model.into();
        self
    }

    /// Base model that submitted jobs train
    pub fn base_model(&self) -> &str {
        &self.base_model
    }

    /// File id of `path`, uploading it unless a pending upload exists
    async fn training_file_id(&self, path: &Path) -> Result<String, LLMError> {
        if let Some(file_id) = self.uploads.lock().ok().and_then(|u| u.get(path).cloned()) {
            debug!(file_id = %file_id, "Reusing uploaded training file");
            return Ok(file_id);
        }

        info!(path = %path.display(), "Uploading training file");
        let file_id = self.provider.upload_training_file(path).await?;
        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.insert(path.to_path_buf(), file_id.clone());
        }
        Ok(file_id)
    }
}

#[async_trait]
impl RemoteJobService for FineTuneJobService {
    async fn submit(&self, artifact: &Artifact) -> Result<JobHandle, ServiceError> {
        let file_id = self.training_file_id(artifact.path()).await?;

        info!(file_id = %file_id, base_model = %self.base_model, "Starting fine-tuning job");
        let job = self
            .provider
            .create_fine_tuning_job(&self.base_model, &file_id)
            .await?;

        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.remove(artifact.path());
        }
        Ok(JobHandle::new(job.id))
    }

    async fn status(&self, handle: &JobHandle) -> Result<JobStatus, ServiceError> {
        match self.provider.retrieve_fine_tuning_job(handle.as_str()).await {
            Ok(job) => Ok(map_job_status(&job)),
            Err(e @ (LLMError::InvalidRequest(_) | LLMError::NotFound(_))) => {
                warn!(handle = %handle, error = %e, "Job handle rejected by the service");
                Ok(JobStatus::Unknown)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Map a remote job to the orchestrator's status model
fn map_job_status(job: &FineTuningJob) -> JobStatus {
    match job.status.as_str() {
        "validating_files" | "queued" => JobStatus::Pending,
        "running" => JobStatus::Running,
        "succeeded" => match job.fine_tuned_model.as_deref() {
            Some(model) if !model.is_empty() => {
                JobStatus::Succeeded(ResultIdentifier::new(model))
            }
            _ => {
                warn!(job_id = %job.id, "Job succeeded without a model name");
                JobStatus::Unknown
            }
        },
        "failed" | "cancelled" => JobStatus::Failed,
        other => {
            warn!(job_id = %job.id, status = other, "Unrecognised job status");
            JobStatus::Unknown
        }
    }
}
