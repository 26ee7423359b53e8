//! Fixed-interval polling of long-running provider jobs.
//!
//! Used for both assistant runs and video renders. The poller only knows
//! [`JobStatus`]; adapters fold provider vocabularies onto it before the
//! snapshot reaches here.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parley_types::error::{BrokerError, ProviderError};
use parley_types::job::{Job, JobKind, JobProgress, JobResult, JobSnapshot, JobStatus};

/// Poll cadence. The effective timeout is `interval * max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 30,
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    pub fn from_millis(interval_ms: u64, max_attempts: u32) -> Self {
        Self::new(Duration::from_millis(interval_ms), max_attempts)
    }
}

/// Drives a job to a terminal status.
#[derive(Debug, Clone, Copy)]
pub struct AsyncJobPoller {
    config: PollConfig,
    tolerate: fn(&ProviderError) -> bool,
}

impl AsyncJobPoller {
    /// Rides out transient fetch failures (network, 429, 5xx).
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            tolerate: ProviderError::is_transient,
        }
    }

    /// Replace the rule for which fetch failures use up an attempt instead
    /// of ending the poll.
    pub fn tolerating(mut self, tolerate: fn(&ProviderError) -> bool) -> Self {
        self.tolerate = tolerate;
        self
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// A fresh job sized to this poller's attempt budget.
    pub fn job(&self, id: impl Into<String>, kind: JobKind) -> Job {
        Job::new(id, kind, self.config.max_attempts)
    }

    /// Sleep, fetch, report, repeat until the job is terminal.
    ///
    /// A tolerated fetch failure uses up an attempt and polling continues.
    /// Any other fetch failure ends polling with that error.
    pub async fn poll_until_terminal<F, Fut, P>(
        &self,
        mut job: Job,
        mut fetch_status: F,
        on_progress: P,
        cancel: &CancellationToken,
    ) -> Result<JobResult, BrokerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<JobSnapshot, ProviderError>>,
        P: Fn(JobProgress),
    {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(job_id = %job.id, kind = %job.kind, attempt = job.attempt, "polling cancelled");
                    return Err(BrokerError::Cancelled);
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }

            job.attempt += 1;

            match fetch_status().await {
                Ok(snapshot) => {
                    job.status = snapshot.status;
                    on_progress(progress(&job));
                    debug!(
                        job_id = %job.id,
                        kind = %job.kind,
                        status = %job.status,
                        attempt = job.attempt,
                        max_attempts = job.max_attempts,
                        "job polled"
                    );

                    if let Some(outcome) = resolve(&job, snapshot) {
                        return outcome;
                    }
                }
                Err(err) if (self.tolerate)(&err) => {
                    on_progress(progress(&job));
                    warn!(
                        job_id = %job.id,
                        attempt = job.attempt,
                        error = %err,
                        "temporary error fetching job status, continuing"
                    );
                }
                Err(err) => {
                    warn!(job_id = %job.id, attempt = job.attempt, error = %err, "job status fetch failed");
                    return Err(err.into());
                }
            }

            if job.attempts_exhausted() {
                job.status = JobStatus::Timeout;
                warn!(job_id = %job.id, kind = %job.kind, attempts = job.attempt, "job timed out");
                return Err(BrokerError::JobTimeout {
                    attempts: job.attempt,
                });
            }
        }
    }
}

fn progress(job: &Job) -> JobProgress {
    JobProgress {
        job_id: job.id.clone(),
        kind: job.kind,
        status: job.status,
        attempt: job.attempt,
        max_attempts: job.max_attempts,
    }
}

/// `None` while the job is unresolved.
fn resolve(job: &Job, snapshot: JobSnapshot) -> Option<Result<JobResult, BrokerError>> {
    match snapshot.status {
        JobStatus::Submitted | JobStatus::Processing => None,
        JobStatus::Succeeded => Some(Ok(JobResult {
            job_id: job.id.clone(),
            attempts: job.attempt,
            artifact: snapshot.artifact,
        })),
        JobStatus::Failed => {
            let (code, message) = snapshot
                .error
                .map(|e| (e.code, e.message))
                .unwrap_or_else(|| ("failed".to_string(), "job failed without details".to_string()));
            Some(Err(BrokerError::JobFailed { code, message }))
        }
        JobStatus::Expired => {
            let message = snapshot
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "job expired".to_string());
            Some(Err(BrokerError::JobFailed {
                code: "expired".to_string(),
                message,
            }))
        }
        JobStatus::RequiresAction => Some(Err(BrokerError::RequiresAction(
            snapshot
                .required_action
                .unwrap_or_else(|| "unknown".to_string()),
        ))),
        JobStatus::Timeout => Some(Err(BrokerError::JobTimeout {
            attempts: job.attempt,
        })),
    }
}
