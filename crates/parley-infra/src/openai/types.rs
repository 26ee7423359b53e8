//! OpenAI Assistants API wire types.
//!
//! These mirror the JSON the Assistants v2 endpoints send and accept. They are
//! NOT the provider-agnostic types from parley-types; conversion happens in
//! the `From` impls at the bottom of this file.

use serde::{Deserialize, Serialize};

use parley_types::job::{JobSnapshot, JobStatus};
use parley_types::provider::{
    Annotation, AssistantInfo, AssistantMessage, ContentPart, FileMeta, RunInfo,
};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CreateMessageRequest {
    pub role: &'static str,
    pub content: Vec<MessageContentInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContentInput {
    Text { text: String },
    ImageFile { image_file: FileRef },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateVectorStoreRequest {
    pub file_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModifyThreadRequest {
    pub tool_resources: ToolResources,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResources {
    pub file_search: FileSearchResources,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSearchResources {
    pub vector_store_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRunRequest {
    pub assistant_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageGenerationRequest {
    pub model: String,
    pub prompt: String,
    pub n: u32,
    pub size: &'static str,
    pub quality: &'static str,
    pub moderation: &'static str,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Any object whose `id` is the only field we read (threads, vector stores).
///
/// `id` is optional: a proxy answering 200 with an unexpected body must not
/// be mistaken for a confirmed object.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectRef {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunObject {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub last_error: Option<RunError>,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequiredAction {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageObject {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub content: Vec<MessageContent>,
    #[serde(default)]
    pub attachments: Vec<MessageAttachment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    ImageFile { image_file: FileRef },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextContent {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<TextAnnotation>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextAnnotation {
    FilePath { file_path: FileRef },
    FileCitation { file_citation: FileRef },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageAttachment {
    #[serde(default)]
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileObject {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantObject {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageData {
    #[serde(default)]
    pub b64_json: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl RunObject {
    pub fn snapshot(&self) -> JobSnapshot {
        let mut snapshot = JobSnapshot::new(JobStatus::from_provider(&self.status));
        if let Some(err) = &self.last_error {
            snapshot = snapshot.with_error(
                err.code.clone().unwrap_or_else(|| self.status.clone()),
                err.message.clone().unwrap_or_default(),
            );
        }
        snapshot.required_action = self.required_action.as_ref().map(|a| a.kind.clone());
        snapshot
    }
}

impl From<RunObject> for RunInfo {
    fn from(run: RunObject) -> Self {
        RunInfo {
            snapshot: run.snapshot(),
            id: run.id,
        }
    }
}

impl From<MessageObject> for AssistantMessage {
    fn from(msg: MessageObject) -> Self {
        let content = msg
            .content
            .into_iter()
            .filter_map(|part| match part {
                MessageContent::Text { text } => Some(ContentPart::Text {
                    value: text.value,
                    annotations: text
                        .annotations
                        .into_iter()
                        .filter_map(|a| match a {
                            TextAnnotation::FilePath { file_path } => Some(Annotation::FilePath {
                                file_id: file_path.file_id,
                            }),
                            TextAnnotation::FileCitation { file_citation } => {
                                Some(Annotation::FileCitation {
                                    file_id: file_citation.file_id,
                                })
                            }
                            TextAnnotation::Unsupported => None,
                        })
                        .collect(),
                }),
                MessageContent::ImageFile { image_file } => Some(ContentPart::ImageFile {
                    file_id: image_file.file_id,
                }),
                MessageContent::Unsupported => None,
            })
            .collect();

        AssistantMessage {
            id: msg.id,
            content,
            attachment_file_ids: msg.attachments.into_iter().filter_map(|a| a.file_id).collect(),
        }
    }
}

impl From<FileObject> for FileMeta {
    fn from(file: FileObject) -> Self {
        FileMeta {
            id: file.id,
            filename: file.filename,
            bytes: file.bytes,
        }
    }
}

impl From<AssistantObject> for AssistantInfo {
    fn from(assistant: AssistantObject) -> Self {
        AssistantInfo {
            id: assistant.id,
            name: assistant.name,
            description: assistant.description,
            model: assistant.model,
            instructions: assistant.instructions,
            created_at: assistant.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_content_serializes_as_parts() {
        let req = CreateMessageRequest {
            role: "user",
            content: vec![
                MessageContentInput::Text {
                    text: "describe this".to_string(),
                },
                MessageContentInput::ImageFile {
                    image_file: FileRef {
                        file_id: "file-img".to_string(),
                    },
                },
            ],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][0]["text"], "describe this");
        assert_eq!(json["content"][1]["type"], "image_file");
        assert_eq!(json["content"][1]["image_file"]["file_id"], "file-img");
    }

    #[test]
    fn test_run_snapshot_carries_error_and_action() {
        let run: RunObject = serde_json::from_str(
            r#"{"id":"run_1","status":"failed","last_error":{"code":"invalid_prompt","message":"bad prompt"}}"#,
        )
        .unwrap();
        let snapshot = run.snapshot();
        assert_eq!(snapshot.status, JobStatus::Failed);
        let err = snapshot.error.unwrap();
        assert_eq!(err.code, "invalid_prompt");
        assert_eq!(err.message, "bad prompt");

        let run: RunObject = serde_json::from_str(
            r#"{"id":"run_2","status":"requires_action","required_action":{"type":"submit_tool_outputs","submit_tool_outputs":{}}}"#,
        )
        .unwrap();
        let info = RunInfo::from(run);
        assert_eq!(info.id, "run_2");
        assert_eq!(info.snapshot.status, JobStatus::RequiresAction);
        assert_eq!(info.snapshot.required_action.as_deref(), Some("submit_tool_outputs"));
    }

    #[test]
    fn test_assistant_message_conversion() {
        let msg: MessageObject = serde_json::from_str(
            r#"{
                "id": "msg_1",
                "role": "assistant",
                "content": [
                    {"type": "text", "text": {"value": "Here is the chart", "annotations": [
                        {"type": "file_path", "text": "sandbox:/chart.png", "file_path": {"file_id": "file-chart"}},
                        {"type": "file_citation", "text": "[1]", "file_citation": {"file_id": "file-doc"}},
                        {"type": "url_citation", "url": "https://example.com"}
                    ]}},
                    {"type": "image_file", "image_file": {"file_id": "file-img"}},
                    {"type": "refusal", "refusal": "no"}
                ],
                "attachments": [{"file_id": "file-csv", "tools": [{"type": "code_interpreter"}]}]
            }"#,
        )
        .unwrap();

        let message = AssistantMessage::from(msg);
        assert_eq!(message.content.len(), 2);
        match &message.content[0] {
            ContentPart::Text { value, annotations } => {
                assert_eq!(value, "Here is the chart");
                assert_eq!(
                    annotations,
                    &vec![
                        Annotation::FilePath {
                            file_id: "file-chart".to_string()
                        },
                        Annotation::FileCitation {
                            file_id: "file-doc".to_string()
                        },
                    ]
                );
            }
            other => panic!("expected text part, got {other:?}"),
        }
        assert_eq!(message.attachment_file_ids, vec!["file-csv".to_string()]);
    }

    #[test]
    fn test_object_ref_without_id() {
        let obj: ObjectRef = serde_json::from_str(r#"{"object":"thread"}"#).unwrap();
        assert!(obj.id.is_none());
    }
}
