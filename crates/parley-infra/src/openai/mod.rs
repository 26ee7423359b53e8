//! OpenAI Assistants v2 adapter.
//!
//! [`OpenAiAssistantProvider`] implements [`AssistantProvider`] over plain
//! `reqwest`: conversation contexts are threads, jobs are runs, and document
//! search is wired up through a per-upload vector store. The same type serves
//! the primary and the fallback endpoint; only the base URL differs.

pub mod types;

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use parley_core::provider::AssistantProvider;
use parley_types::config::ProviderSettings;
use parley_types::error::ProviderError;
use parley_types::job::JobSnapshot;
use parley_types::provider::{
    AssistantInfo, AssistantMessage, FileMeta, FilePurpose, GeneratedImage, RunInfo, UserMessage,
};

use crate::config::Secrets;

use self::types::{
    AssistantObject, CreateMessageRequest, CreateRunRequest, CreateVectorStoreRequest, ErrorEnvelope, FileObject,
    FileRef, FileSearchResources, ImageData, ImageGenerationRequest, ListResponse,
    MessageContentInput, MessageObject, ModifyThreadRequest, ObjectRef, RunObject, ToolResources,
};

/// How a 404 should be read: a missing thread means the conversation
/// context is gone, a missing file is just a missing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Context,
    Resource,
}

/// OpenAI Assistants provider.
///
/// # API Key Security
///
/// The key is held as a [`SecretString`] and only exposed while building the
/// `Authorization` header. This type does NOT derive Debug.
pub struct OpenAiAssistantProvider {
    client: reqwest::Client,
    api_key: SecretString,
    name: String,
    base_url: String,
    image_model: String,
}

impl OpenAiAssistantProvider {
    const BETA_HEADER: &'static str = "assistants=v2";

    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            image_model: "gpt-image-1".to_string(),
        })
    }

    /// Provider for the configured primary endpoint.
    pub fn primary(settings: &ProviderSettings, secrets: &Secrets) -> Result<Self, ProviderError> {
        Self::from_settings("openai-primary", &settings.primary_base_url, settings, secrets)
    }

    /// Provider for the configured fallback endpoint.
    pub fn fallback(settings: &ProviderSettings, secrets: &Secrets) -> Result<Self, ProviderError> {
        Self::from_settings("openai-fallback", &settings.fallback_base_url, settings, secrets)
    }

    fn from_settings(
        name: &str,
        base_url: &str,
        settings: &ProviderSettings,
        secrets: &Secrets,
    ) -> Result<Self, ProviderError> {
        let provider = Self::new(
            name,
            base_url,
            secrets.openai_key_or_empty(),
            Duration::from_secs(settings.request_timeout_secs),
        )?;
        Ok(provider.with_image_model(&settings.image_model))
    }

    pub fn with_image_model(mut self, model: &str) -> Self {
        self.image_model = model.to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(self.api_key.expose_secret())
            .header("OpenAI-Beta", Self::BETA_HEADER)
    }

    /// Send and turn any non-2xx status into a [`ProviderError`].
    async fn send(&self, request: RequestBuilder, scope: Scope) -> Result<Response, ProviderError> {
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_ms = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .map(|secs| (secs * 1000.0) as u64);
        let body = response.text().await.unwrap_or_default();
        Err(map_error(status, retry_after_ms, &body, scope))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        scope: Scope,
    ) -> Result<T, ProviderError> {
        self.send(request, scope)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Deserialization(format!("failed to parse response: {e}")))
    }
}

// OpenAiAssistantProvider intentionally does NOT derive Debug; the client
// request builders would carry the bearer token.

impl AssistantProvider for OpenAiAssistantProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        self.send(self.request(Method::GET, "/models"), Scope::Resource)
            .await
            .map(|_| ())
    }

    async fn create_context(&self) -> Result<String, ProviderError> {
        let thread: ObjectRef = self
            .send_json(
                self.request(Method::POST, "/threads").json(&serde_json::json!({})),
                Scope::Resource,
            )
            .await?;
        thread
            .id
            .ok_or_else(|| ProviderError::Deserialization("thread response has no id".to_string()))
    }

    async fn context_exists(&self, context_id: &str) -> Result<bool, ProviderError> {
        let result = self
            .send_json::<ObjectRef>(
                self.request(Method::GET, &format!("/threads/{context_id}")),
                Scope::Context,
            )
            .await;

        match result {
            Ok(ObjectRef { id: Some(_) }) => Ok(true),
            Ok(ObjectRef { id: None }) => {
                tracing::warn!(
                    provider = %self.name,
                    context_id,
                    "thread lookup returned no id; treating context as unverified"
                );
                Ok(false)
            }
            Err(ProviderError::ContextExpired(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn append_message(
        &self,
        context_id: &str,
        message: &UserMessage,
    ) -> Result<(), ProviderError> {
        let mut content = vec![MessageContentInput::Text {
            text: message.text.clone(),
        }];
        content.extend(message.image_file_ids.iter().map(|id| MessageContentInput::ImageFile {
            image_file: FileRef {
                file_id: id.clone(),
            },
        }));

        let body = CreateMessageRequest {
            role: "user",
            content,
        };
        self.send(
            self.request(Method::POST, &format!("/threads/{context_id}/messages"))
                .json(&body),
            Scope::Context,
        )
        .await
        .map(|_| ())
    }

    async fn upload_file(
        &self,
        filename: &str,
        bytes: &[u8],
        purpose: FilePurpose,
    ) -> Result<String, ProviderError> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .text("purpose", purpose.as_str())
            .part("file", part);

        let file: FileObject = self
            .send_json(self.request(Method::POST, "/files").multipart(form), Scope::Resource)
            .await?;
        tracing::debug!(provider = %self.name, file_id = %file.id, filename, "uploaded file");
        Ok(file.id)
    }

    async fn attach_file_search(
        &self,
        context_id: &str,
        file_ids: &[String],
    ) -> Result<(), ProviderError> {
        let store: ObjectRef = self
            .send_json(
                self.request(Method::POST, "/vector_stores")
                    .json(&CreateVectorStoreRequest {
                        file_ids: file_ids.to_vec(),
                    }),
                Scope::Resource,
            )
            .await?;
        let store_id = store.id.ok_or_else(|| {
            ProviderError::Deserialization("vector store response has no id".to_string())
        })?;

        let body = ModifyThreadRequest {
            tool_resources: ToolResources {
                file_search: FileSearchResources {
                    vector_store_ids: vec![store_id],
                },
            },
        };
        self.send(
            self.request(Method::POST, &format!("/threads/{context_id}"))
                .json(&body),
            Scope::Context,
        )
        .await
        .map(|_| ())
    }

    async fn create_run(&self, context_id: &str, assistant_id: &str) -> Result<RunInfo, ProviderError> {
        let run: RunObject = self
            .send_json(
                self.request(Method::POST, &format!("/threads/{context_id}/runs"))
                    .json(&CreateRunRequest {
                        assistant_id: assistant_id.to_string(),
                    }),
                Scope::Context,
            )
            .await?;
        Ok(run.into())
    }

    async fn fetch_run(&self, context_id: &str, run_id: &str) -> Result<JobSnapshot, ProviderError> {
        let run: RunObject = self
            .send_json(
                self.request(Method::GET, &format!("/threads/{context_id}/runs/{run_id}")),
                Scope::Context,
            )
            .await?;
        Ok(run.snapshot())
    }

    async fn list_runs(&self, context_id: &str) -> Result<Vec<RunInfo>, ProviderError> {
        let runs: ListResponse<RunObject> = self
            .send_json(
                self.request(Method::GET, &format!("/threads/{context_id}/runs?limit=20&order=desc")),
                Scope::Context,
            )
            .await?;
        Ok(runs.data.into_iter().map(RunInfo::from).collect())
    }

    async fn latest_assistant_message(
        &self,
        context_id: &str,
    ) -> Result<Option<AssistantMessage>, ProviderError> {
        let messages: ListResponse<MessageObject> = self
            .send_json(
                self.request(
                    Method::GET,
                    &format!("/threads/{context_id}/messages?limit=1&order=desc"),
                ),
                Scope::Context,
            )
            .await?;
        Ok(messages
            .data
            .into_iter()
            .find(|m| m.role == "assistant")
            .map(AssistantMessage::from))
    }

    async fn file_meta(&self, file_id: &str) -> Result<FileMeta, ProviderError> {
        let file: FileObject = self
            .send_json(self.request(Method::GET, &format!("/files/{file_id}")), Scope::Resource)
            .await?;
        Ok(file.into())
    }

    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .send(
                self.request(Method::GET, &format!("/files/{file_id}/content")),
                Scope::Resource,
            )
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Network(format!("failed to read file content: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, ProviderError> {
        let body = ImageGenerationRequest {
            model: self.image_model.clone(),
            prompt: prompt.to_string(),
            n: 1,
            size: "1024x1024",
            quality: "high",
            moderation: "low",
        };
        let images: ListResponse<ImageData> = self
            .send_json(
                self.request(Method::POST, "/images/generations").json(&body),
                Scope::Resource,
            )
            .await?;
        let image = images
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Deserialization("no image in response".to_string()))?;
        decode_image(image)
    }

    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantInfo, ProviderError> {
        let assistant: AssistantObject = self
            .send_json(
                self.request(Method::GET, &format!("/assistants/{assistant_id}")),
                Scope::Resource,
            )
            .await?;
        Ok(assistant.into())
    }

    async fn edit_image(&self, image: &[u8], prompt: &str) -> Result<GeneratedImage, ProviderError> {
        let part = reqwest::multipart::Part::bytes(image.to_vec())
            .file_name("image.png")
            .mime_str("image/png")
            .map_err(|e| ProviderError::Network(format!("invalid image part: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("prompt", prompt.to_string())
            .text("model", self.image_model.clone())
            .text("n", "1")
            .text("size", "1024x1024")
            .text("quality", "high");

        let images: ListResponse<ImageData> = self
            .send_json(
                self.request(Method::POST, "/images/edits").multipart(form),
                Scope::Resource,
            )
            .await?;
        let image = images
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Deserialization("no image in response".to_string()))?;
        decode_image(image)
    }
}

fn decode_image(image: ImageData) -> Result<GeneratedImage, ProviderError> {
    match (image.b64_json, image.url) {
        (Some(b64), _) => STANDARD
            .decode(b64.as_bytes())
            .map(GeneratedImage::Bytes)
            .map_err(|e| ProviderError::Deserialization(format!("invalid image payload: {e}"))),
        (None, Some(url)) => Ok(GeneratedImage::Url(url)),
        (None, None) => Err(ProviderError::Deserialization(
            "image response has neither b64_json nor url".to_string(),
        )),
    }
}

/// Map a non-2xx response onto [`ProviderError`].
fn map_error(status: StatusCode, retry_after_ms: Option<u64>, body: &str, scope: Scope) -> ProviderError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());

    let lower = message.to_lowercase();
    if lower.contains("vector store") && lower.contains("expired") {
        return ProviderError::ContextExpired(message);
    }

    match status.as_u16() {
        401 => ProviderError::AuthenticationFailed,
        429 => ProviderError::RateLimited { retry_after_ms },
        404 if scope == Scope::Context => ProviderError::ContextExpired(message),
        404 => ProviderError::NotFound(message),
        code => ProviderError::Http {
            status: code,
            message,
        },
    }
}
