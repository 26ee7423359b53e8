//! Turns a raw assistant message into an [`Answer`].

use futures_util::future::try_join;
use tracing::{debug, warn};

use parley_types::conversation::{Answer, Attachment};
use parley_types::provider::{Annotation, AssistantMessage, ContentPart};

use crate::provider::BoxAssistantProvider;

pub struct AnswerAssembler;

impl AnswerAssembler {
    /// Join text parts with newlines and download every referenced file.
    ///
    /// Files that fail to download are logged and left out; the text is
    /// always returned.
    pub async fn assemble(message: &AssistantMessage, provider: &BoxAssistantProvider) -> Answer {
        let text = Self::text(message);
        let file_ids = Self::file_ids(message);

        let mut attachments = Vec::with_capacity(file_ids.len());
        for file_id in &file_ids {
            match try_join(provider.file_meta(file_id), provider.file_content(file_id)).await {
                Ok((meta, bytes)) => {
                    let filename = meta.filename.unwrap_or_else(|| file_id.clone());
                    debug!(file_id = %file_id, filename = %filename, size = bytes.len(), "attachment downloaded");
                    attachments.push(Attachment { filename, bytes });
                }
                Err(err) => {
                    warn!(file_id = %file_id, error = %err, "failed to download attachment, skipping");
                }
            }
        }

        Answer::new(text, attachments)
    }

    fn text(message: &AssistantMessage) -> String {
        message
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { value, .. } => Some(value.as_str()),
                ContentPart::ImageFile { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Generated-file annotations, image parts, then explicit attachments.
    /// De-duplicated, first occurrence wins.
    pub fn file_ids(message: &AssistantMessage) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        let mut push = |id: &str| {
            if !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        };

        for part in &message.content {
            match part {
                ContentPart::Text { annotations, .. } => {
                    for annotation in annotations {
                        if let Annotation::FilePath { file_id } = annotation {
                            push(file_id);
                        }
                    }
                }
                ContentPart::ImageFile { file_id } => push(file_id),
            }
        }
        for file_id in &message.attachment_file_ids {
            push(file_id);
        }

        ids
    }
}
