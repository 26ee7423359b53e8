//! Kling video generation adapter.
//!
//! Renders are submitted to `/v1/videos/{text2video|image2video}` and polled
//! at `/v1/videos/{kind}/{task_id}`. Kling has shipped several response
//! envelopes over time, so status, URL and task id are each looked up at a
//! list of known locations, first match wins.

pub mod token;

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;

use parley_core::video::VideoProvider;
use parley_types::config::VideoSettings;
use parley_types::error::ProviderError;
use parley_types::job::{JobKind, JobSnapshot, JobStatus};
use parley_types::video::{VideoRequest, VideoSubmission};

use crate::config::Secrets;

use self::token::Claims;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const SUBMIT_STATUS: &[&str] = &["/status", "/data/status", "/data/task_status", "/result/status"];
const SUBMIT_URL: &[&str] = &["/video_url", "/url", "/data/video_url", "/data/url"];
const SUBMIT_TASK_ID: &[&str] = &["/id", "/task_id", "/data/id", "/data/task_id"];

const POLL_STATUS: &[&str] = &["/data/task_status", "/status", "/data/status", "/result/status"];
const POLL_URL: &[&str] = &[
    "/data/task_result/videos/0/url",
    "/video_url",
    "/url",
    "/data/video_url",
    "/data/url",
];
const POLL_ERROR: &[&str] = &[
    "/data/task_status_msg",
    "/error",
    "/message",
    "/data/error",
    "/data/message",
];

#[derive(Debug, Serialize)]
struct Text2VideoRequest<'a> {
    model_name: &'a str,
    prompt: &'a str,
    duration: &'a str,
    aspect_ratio: &'a str,
    mode: &'a str,
}

#[derive(Debug, Serialize)]
struct Image2VideoRequest<'a> {
    model_name: &'a str,
    mode: &'a str,
    duration: &'a str,
    image: String,
    prompt: &'a str,
    cfg_scale: f64,
}

/// Kling video provider.
///
/// Keys are held as [`SecretString`]s and only exposed while signing a
/// request token. This type does NOT derive Debug.
pub struct KlingVideoProvider {
    client: reqwest::Client,
    access_key: Option<SecretString>,
    secret_key: Option<SecretString>,
    settings: VideoSettings,
}

impl KlingVideoProvider {
    pub fn new(
        settings: VideoSettings,
        access_key: Option<SecretString>,
        secret_key: Option<SecretString>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            access_key,
            secret_key,
            settings,
        })
    }

    pub fn from_secrets(settings: VideoSettings, secrets: &Secrets) -> Result<Self, ProviderError> {
        Self::new(
            settings,
            secrets.kling_access_key.clone(),
            secrets.kling_secret_key.clone(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.api_url.trim_end_matches('/'), path)
    }

    /// Fresh signed token. A new one is minted per request.
    fn bearer_token(&self) -> Result<String, ProviderError> {
        let (Some(access), Some(secret)) = (&self.access_key, &self.secret_key) else {
            return Err(ProviderError::AuthenticationFailed);
        };
        let claims = Claims::issued_at(
            access.expose_secret(),
            chrono::Utc::now().timestamp(),
            self.settings.token_ttl_secs as i64,
        );
        token::encode(&claims, secret.expose_secret().as_bytes()).map_err(|e| {
            tracing::warn!(error = %e, "failed to sign video provider token");
            ProviderError::AuthenticationFailed
        })
    }

    async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
        let response = request
            .bearer_auth(self.bearer_token()?)
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_error(status, &body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ProviderError::Deserialization(format!("failed to parse response: {e}")))
    }
}

impl VideoProvider for KlingVideoProvider {
    fn name(&self) -> &str {
        "kling"
    }

    fn is_configured(&self) -> bool {
        crate::config::is_set(&self.access_key) && crate::config::is_set(&self.secret_key)
    }

    async fn submit(&self, request: &VideoRequest) -> Result<VideoSubmission, ProviderError> {
        let s = &self.settings;
        let path = format!("/v1/videos/{}", request.kind());
        let builder = self.client.post(self.url(&path));
        let builder = match request {
            VideoRequest::TextToVideo { prompt } => builder.json(&Text2VideoRequest {
                model_name: &s.model_name,
                prompt,
                duration: &s.duration,
                aspect_ratio: &s.aspect_ratio,
                mode: &s.mode,
            }),
            VideoRequest::ImageToVideo { image, prompt } => builder.json(&Image2VideoRequest {
                model_name: &s.model_name,
                mode: &s.mode,
                duration: &s.duration,
                image: STANDARD.encode(image),
                prompt,
                cfg_scale: s.cfg_scale,
            }),
        };

        tracing::debug!(kind = %request.kind(), "submitting video task");
        let body = self.send_json(builder).await?;
        Ok(parse_submission(&body))
    }

    async fn fetch_status(&self, kind: JobKind, task_id: &str) -> Result<JobSnapshot, ProviderError> {
        let segment = kind
            .video_path()
            .ok_or_else(|| ProviderError::UnsupportedInput(format!("{kind} is not a video job")))?;
        let body = self
            .send_json(self.client.get(self.url(&format!("/v1/videos/{segment}/{task_id}"))))
            .await?;
        Ok(parse_status(&body))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("download failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_error(status, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Network(format!("download interrupted: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// First string (or number) found at any of `pointers`.
fn first_str(body: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| match body.pointer(p)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn parse_submission(body: &Value) -> VideoSubmission {
    let task_id = first_str(body, SUBMIT_TASK_ID);
    let snapshot = match first_str(body, SUBMIT_STATUS) {
        Some(status) => {
            let mut snapshot = JobSnapshot::new(JobStatus::from_provider(&status));
            if let Some(url) = first_str(body, SUBMIT_URL) {
                snapshot = snapshot.with_artifact(url);
            }
            if snapshot.status == JobStatus::Failed {
                let message = first_str(body, POLL_ERROR)
                    .unwrap_or_else(|| format!("unexpected status: {status}"));
                snapshot = snapshot.with_error(status, message);
            }
            snapshot
        }
        None => JobSnapshot::new(JobStatus::Failed)
            .with_error("unexpected_status", "unexpected status: missing"),
    };

    VideoSubmission { task_id, snapshot }
}

fn parse_status(body: &Value) -> JobSnapshot {
    let status = first_str(body, POLL_STATUS)
        .map(|s| JobStatus::from_provider(&s))
        .unwrap_or(JobStatus::Processing);

    let mut snapshot = JobSnapshot::new(status);
    if let Some(url) = first_str(body, POLL_URL) {
        snapshot = snapshot.with_artifact(url);
    }
    if status == JobStatus::Failed {
        let message =
            first_str(body, POLL_ERROR).unwrap_or_else(|| "video generation failed".to_string());
        snapshot = snapshot.with_error("failed", message);
    }
    snapshot
}

fn map_error(status: StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| first_str(&v, &["/message", "/error/message", "/error"]))
        .unwrap_or_else(|| body.to_string());

    match status.as_u16() {
        401 | 403 => ProviderError::AuthenticationFailed,
        429 => ProviderError::RateLimited {
            retry_after_ms: None,
        },
        404 => ProviderError::NotFound(message),
        code => ProviderError::Http {
            status: code,
            message,
        },
    }
}
