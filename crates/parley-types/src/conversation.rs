//! Conversation-level types: contexts, answers, user attachments and
//! diagnostic snapshots.

use serde::{Deserialize, Serialize};

/// The provider-side conversation an owner's messages accumulate in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub id: String,
    pub owner_id: i64,
}

/// A binary attachment returned with an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Normalized reply delivered to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl Answer {
    /// A text-only answer.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn new(text: String, attachments: Vec<Attachment>) -> Self {
        Self { text, attachments }
    }
}

/// File sent by the user alongside a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAttachment {
    /// Shown to the assistant as an image content part.
    Image { bytes: Vec<u8> },
    /// Made searchable for the assistant through a file-search store.
    Document { filename: String, bytes: Vec<u8> },
}

impl InputAttachment {
    pub fn filename(&self) -> &str {
        match self {
            InputAttachment::Image { .. } => "image.png",
            InputAttachment::Document { filename, .. } => filename,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            InputAttachment::Image { bytes } | InputAttachment::Document { bytes, .. } => bytes,
        }
    }
}

/// Diagnostic view of one cached conversation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveContextStatus {
    pub context_id: String,
    pub owner_id: i64,
    pub is_locked: bool,
}

/// Result of sweeping cached contexts the provider no longer knows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub cleaned: u32,
    pub errors: u32,
}
