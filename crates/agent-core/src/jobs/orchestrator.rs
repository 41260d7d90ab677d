//! Remote job orchestration
//!
//! [`JobOrchestrator::ensure_result`] walks this state machine:
//!
//! ```text
//! NoHandle --load--> (status once) --succeeded--> Succeeded
//!                                  --pending/running--> Polling
//!                                  --failed/unknown--> Submitted
//! NoHandle --no handle--> Submitted --persist handle--> Polling
//! Polling --succeeded--> Succeeded
//! Polling --failed/unknown--> Failed
//! ```
//!
//! The handle is saved before polling starts, and cancellation or a poll
//! limit leave it in place so a later call resumes the same job. Cancellation
//! is observed at every step, including backoff sleeps inside remote calls.

use super::service::{RemoteJobService, ServiceError};
use super::store::HandleStore;
use super::types::{Artifact, JobHandle, JobStatus, ResultIdentifier};
use crate::retry::{BackoffInvoker, RetryError, RetryPolicy};
use crate::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Polling and retry settings for [`JobOrchestrator`]
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Wait between two status queries
    pub poll_interval: Duration,

    /// Give up after this many status queries
    pub max_polls: Option<u32>,

    /// Give up once polling has taken this long
    pub poll_timeout: Option<Duration>,

    /// Retry policy for each submit and status call
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            max_polls: None,
            poll_timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Cap the number of status queries
    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = Some(max_polls);
        self
    }

    /// Cap the total polling time
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    /// Set the retry policy for remote calls
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Outcome of checking a persisted handle
enum Resume {
    Done(ResultIdentifier),
    Monitor,
    Resubmit,
}

/// Drives one remote job per key to completion
///
/// Several orchestrators may share a store as long as they use different
/// keys.
pub struct JobOrchestrator {
    service: Arc<dyn RemoteJobService>,
    store: Arc<dyn HandleStore>,
    key: String,
    config: OrchestratorConfig,
    invoker: BackoffInvoker,
}

impl JobOrchestrator {
    /// Create an orchestrator tracking the job stored under `key`
    pub fn new(
        service: Arc<dyn RemoteJobService>,
        store: Arc<dyn HandleStore>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            service,
            store,
            key: key.into(),
            config: OrchestratorConfig::default(),
            invoker: BackoffInvoker::new(),
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Get a usable result, submitting and polling as needed
    pub async fn ensure_result(&self, artifact: &Artifact) -> Result<ResultIdentifier> {
        self.ensure_result_with_cancel(artifact, &CancellationToken::new())
            .await
    }

    /// Like [`ensure_result`](Self::ensure_result), stopping with
    /// [`Error::Cancelled`] once `cancel` fires
    #[instrument(skip_all, fields(key = %self.key, artifact = %artifact.name()))]
    pub async fn ensure_result_with_cancel(
        &self,
        artifact: &Artifact,
        cancel: &CancellationToken,
    ) -> Result<ResultIdentifier> {
        self.config.retry.validate()?;

        let stored = self.store.load(&self.key)?;
        if let Some(handle) = &stored {
            let resume = self
                .until_cancelled(cancel, Some(handle), self.resume(handle))
                .await?;
            match resume {
                Resume::Done(result) => return Ok(result),
                Resume::Monitor => return self.monitor(handle, true, cancel).await,
                Resume::Resubmit => {}
            }
        }

        // Never replace the stored handle once cancelled
        if cancel.is_cancelled() {
            return Err(self.cancelled(stored.as_ref()));
        }

        let handle = self.submit(artifact, stored.as_ref(), cancel).await?;
        self.monitor(&handle, false, cancel).await
    }

    /// Run `work` unless `cancel` fires first
    async fn until_cancelled<T>(
        &self,
        cancel: &CancellationToken,
        handle: Option<&JobHandle>,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(self.cancelled(handle)),
            result = work => result,
        }
    }

    fn cancelled(&self, handle: Option<&JobHandle>) -> Error {
        info!(key = %self.key, "Cancelled, leaving job handle in place");
        Error::Cancelled {
            key: self.key.clone(),
            handle: handle.cloned(),
        }
    }

    /// Query a persisted handle once
    async fn resume(&self, handle: &JobHandle) -> Result<Resume> {
        let status = self.query_status(handle).await?;

        Ok(match status {
            JobStatus::Succeeded(result) => {
                info!(handle = %handle, result = %result, "Job already completed");
                Resume::Done(result)
            }
            JobStatus::Pending | JobStatus::Running => {
                info!(handle = %handle, status = %status, "Job still in progress, resuming");
                Resume::Monitor
            }
            JobStatus::Failed | JobStatus::Unknown => {
                info!(handle = %handle, status = %status, "Previous job unusable, submitting a new one");
                Resume::Resubmit
            }
        })
    }

    /// Submit the artifact and persist the new handle
    async fn submit(
        &self,
        artifact: &Artifact,
        previous: Option<&JobHandle>,
        cancel: &CancellationToken,
    ) -> Result<JobHandle> {
        info!(artifact = %artifact.name(), "Submitting new job");

        let submission = async {
            self.invoker
                .invoke("submit job", &self.config.retry, || {
                    self.service.submit(artifact)
                })
                .await
                .map_err(Error::from)
        };
        let handle = self.until_cancelled(cancel, previous, submission).await?;

        if let Err(e) = self.store.save(&self.key, &handle) {
            error!(handle = %handle, error = %e, "Job submitted but its handle could not be persisted");
            return Err(e);
        }

        info!(handle = %handle, "Job submitted");
        Ok(handle)
    }

    async fn query_status(
        &self,
        handle: &JobHandle,
    ) -> std::result::Result<JobStatus, RetryError<ServiceError>> {
        self.invoker
            .invoke("job status", &self.config.retry, || {
                self.service.status(handle)
            })
            .await
    }

    /// Poll until the job reaches a terminal state
    ///
    /// When `resumed` is set the caller has just queried the status, so the
    /// loop waits before its first query.
    async fn monitor(
        &self,
        handle: &JobHandle,
        resumed: bool,
        cancel: &CancellationToken,
    ) -> Result<ResultIdentifier> {
        let deadline = self.config.poll_timeout.map(|t| Instant::now() + t);
        let mut polls: u32 = u32::from(resumed);
        let mut wait_first = resumed;

        info!(handle = %handle, interval_secs = self.config.poll_interval.as_secs(), "Monitoring job");

        loop {
            if wait_first {
                self.wait(handle, polls, deadline, cancel).await?;
            }
            wait_first = true;
            polls += 1;

            let status = self
                .until_cancelled(cancel, Some(handle), async {
                    Ok::<_, Error>(self.query_status(handle).await)
                })
                .await?;

            match status {
                Ok(JobStatus::Succeeded(result)) => {
                    info!(handle = %handle, result = %result, polls, "Job succeeded");
                    return Ok(result);
                }
                Ok(status @ (JobStatus::Failed | JobStatus::Unknown)) => {
                    warn!(handle = %handle, status = %status, polls, "Job did not succeed");
                    return Err(Error::JobFailed {
                        handle: handle.clone(),
                        status,
                    });
                }
                Ok(status) => {
                    debug!(handle = %handle, status = %status, polls, "Job in progress");
                }
                Err(RetryError::Exhausted {
                    attempts,
                    last_error,
                    ..
                }) => {
                    warn!(
                        handle = %handle,
                        attempts,
                        error = %last_error,
                        "Status check failed, will keep polling"
                    );
                }
                Err(e @ RetryError::Fatal { .. }) => return Err(e.into()),
            }
        }
    }

    /// Sleep one poll interval, honouring limits and cancellation
    async fn wait(
        &self,
        handle: &JobHandle,
        polls: u32,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let limit_hit = self.config.max_polls.is_some_and(|max| polls >= max)
            || deadline.is_some_and(|d| Instant::now() + self.config.poll_interval > d);
        if limit_hit {
            warn!(handle = %handle, polls, "Poll limit reached, leaving job handle in place");
            return Err(Error::PollLimitExceeded {
                handle: handle.clone(),
                polls,
            });
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(self.cancelled(Some(handle))),
            () = sleep(self.config.poll_interval) => Ok(()),
        }
    }
}
