//! Long-running provider jobs: assistant runs and video renders.
//!
//! Providers report status with their own vocabularies (`in_progress`,
//! `succeed`, `requires_action`, ...). Everything is folded onto
//! [`JobStatus`] at the adapter boundary so the poller only ever sees one
//! state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What kind of work a job represents. Selects the status endpoint family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Run,
    #[serde(rename = "text2video")]
    VideoText2Video,
    #[serde(rename = "image2video")]
    VideoImage2Video,
}

impl JobKind {
    /// Path segment used by video endpoints; runs have none.
    pub fn video_path(&self) -> Option<&'static str> {
        match self {
            JobKind::Run => None,
            JobKind::VideoText2Video => Some("text2video"),
            JobKind::VideoImage2Video => Some("image2video"),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Run => write!(f, "run"),
            JobKind::VideoText2Video => write!(f, "text2video"),
            JobKind::VideoImage2Video => write!(f, "image2video"),
        }
    }
}

/// Normalized job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Submitted,
    Processing,
    Succeeded,
    Failed,
    Expired,
    RequiresAction,
    Timeout,
}

impl JobStatus {
    /// Terminal statuses end polling.
    pub fn is_terminal(&self) -> bool {
        !self.is_unresolved()
    }

    /// Submitted or still processing.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, JobStatus::Submitted | JobStatus::Processing)
    }

    /// Map a provider status string. Unknown values are treated as still
    /// processing so a new provider status never ends a job early.
    pub fn from_provider(raw: &str) -> Self {
        raw.parse().unwrap_or(JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Submitted => write!(f, "submitted"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Expired => write!(f, "expired"),
            JobStatus::RequiresAction => write!(f, "requires_action"),
            JobStatus::Timeout => write!(f, "timeout"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "submitted" | "queued" => Ok(JobStatus::Submitted),
            "processing" | "in_progress" | "cancelling" => Ok(JobStatus::Processing),
            "succeeded" | "succeed" | "completed" => Ok(JobStatus::Succeeded),
            "failed" | "cancelled" | "incomplete" => Ok(JobStatus::Failed),
            "expired" => Ok(JobStatus::Expired),
            "requires_action" => Ok(JobStatus::RequiresAction),
            "timeout" => Ok(JobStatus::Timeout),
            other => Err(format!("invalid job status: '{other}'")),
        }
    }
}

/// Error detail a provider attaches to a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobErrorDetail {
    pub code: String,
    pub message: String,
}

/// One observation of a job's state, as returned by a status fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub status: JobStatus,
    /// Artifact reference (video URL, run id) once available.
    pub artifact: Option<String>,
    pub error: Option<JobErrorDetail>,
    /// Provider's required-action descriptor (e.g. `submit_tool_outputs`).
    pub required_action: Option<String>,
}

impl JobSnapshot {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            artifact: None,
            error: None,
            required_action: None,
        }
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(JobErrorDetail {
            code: code.into(),
            message: message.into(),
        });
        self
    }
}

/// A job tracked by the poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub attempt: u32,
    pub max_attempts: u32,
}

impl Job {
    pub fn new(id: impl Into<String>, kind: JobKind, max_attempts: u32) -> Self {
        Self {
            id: id.into(),
            kind,
            status: JobStatus::Submitted,
            attempt: 0,
            max_attempts,
        }
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Progress event emitted after each poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub attempt: u32,
    pub max_attempts: u32,
}

/// Successful terminal outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub attempts: u32,
    pub artifact: Option<String>,
}
