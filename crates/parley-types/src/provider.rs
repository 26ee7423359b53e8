//! Provider-neutral shapes for the assistant API.
//!
//! These model the subset of an assistants-style API the broker relies on:
//! messages with content parts and annotations, runs, and stored files.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::JobSnapshot;

/// Which of the two interchangeable endpoints served a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderRole {
    Primary,
    Fallback,
}

impl fmt::Display for ProviderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderRole::Primary => write!(f, "primary"),
            ProviderRole::Fallback => write!(f, "fallback"),
        }
    }
}

/// Snapshot of endpoint health for status endpoints and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub primary_endpoint: String,
    pub fallback_endpoint: String,
    pub is_primary_available: bool,
}

/// A user message about to be appended to a context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessage {
    pub text: String,
    /// Uploaded image files shown inline to the assistant.
    #[serde(default)]
    pub image_file_ids: Vec<String>,
}

impl UserMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image_file_ids: Vec::new(),
        }
    }
}

/// What an uploaded file is for. Images shown inline use `Vision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilePurpose {
    Assistants,
    Vision,
}

impl FilePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilePurpose::Assistants => "assistants",
            FilePurpose::Vision => "vision",
        }
    }
}

/// Annotation attached to a text part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    /// A file generated by the assistant (e.g. a chart or CSV).
    FilePath { file_id: String },
    /// A citation into a searched file. Not downloaded.
    FileCitation { file_id: String },
}

/// One content part of an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        value: String,
        #[serde(default)]
        annotations: Vec<Annotation>,
    },
    ImageFile {
        file_id: String,
    },
}

/// A message produced by the assistant, before assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub id: String,
    pub content: Vec<ContentPart>,
    /// File ids attached explicitly to the message.
    #[serde(default)]
    pub attachment_file_ids: Vec<String>,
}

/// Metadata for a stored provider file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub id: String,
    pub filename: Option<String>,
    pub bytes: Option<u64>,
}

/// A run as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub id: String,
    pub snapshot: JobSnapshot,
}

/// Assistant definition as the provider reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantInfo {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub model: Option<String>,
    pub instructions: Option<String>,
    pub created_at: Option<i64>,
}

/// Result of an assistant availability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssistantStatus {
    Available(AssistantInfo),
    Unavailable { id: String, error: String },
}

impl AssistantStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, AssistantStatus::Available(_))
    }
}

/// Output of an image generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedImage {
    Bytes(Vec<u8>),
    Url(String),
}
