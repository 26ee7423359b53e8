//! Video generation request/response types.

use serde::{Deserialize, Serialize};

use crate::job::{JobKind, JobSnapshot};

/// What to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoRequest {
    TextToVideo { prompt: String },
    ImageToVideo { image: Vec<u8>, prompt: String },
}

impl VideoRequest {
    pub fn prompt(&self) -> &str {
        match self {
            VideoRequest::TextToVideo { prompt } | VideoRequest::ImageToVideo { prompt, .. } => {
                prompt
            }
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            VideoRequest::TextToVideo { .. } => JobKind::VideoText2Video,
            VideoRequest::ImageToVideo { .. } => JobKind::VideoImage2Video,
        }
    }

    /// Same request with the prompt replaced.
    pub fn with_prompt(self, prompt: String) -> Self {
        match self {
            VideoRequest::TextToVideo { .. } => VideoRequest::TextToVideo { prompt },
            VideoRequest::ImageToVideo { image, .. } => VideoRequest::ImageToVideo { image, prompt },
        }
    }
}

/// Response to a submission: the provider may finish synchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSubmission {
    pub task_id: Option<String>,
    pub snapshot: JobSnapshot,
}

/// Caller-facing outcome. Never an error: failures are described in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoOutcome {
    pub success: bool,
    pub artifact_url: Option<String>,
    pub error: Option<String>,
}

impl VideoOutcome {
    pub fn succeeded(url: impl Into<String>) -> Self {
        Self {
            success: true,
            artifact_url: Some(url.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            artifact_url: None,
            error: Some(error.into()),
        }
    }
}
