//! Video generation: submit a render, poll it to completion, hand back a URL.
//!
//! Rendering providers may answer a submission synchronously (status
//! succeeded with a URL) or with a task id to poll. Polling goes through the
//! same [`AsyncJobPoller`] used for assistant runs.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use parley_types::error::{BrokerError, ProviderError};
use parley_types::job::{JobKind, JobProgress, JobSnapshot, JobStatus};
use parley_types::video::{VideoOutcome, VideoRequest, VideoSubmission};

use crate::orchestrator::ConversationOrchestrator;
use crate::poller::AsyncJobPoller;
use crate::retry::{RetryPolicy, retry_transient};
use crate::store::ConversationContextStore;

pub const CREDENTIALS_MISSING: &str = "video provider credentials are not configured";

/// Trait for video rendering backends.
///
/// Implementations live in parley-infra (e.g., `KlingVideoProvider`).
pub trait VideoProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether credentials are present. Nothing is sent when this is false.
    fn is_configured(&self) -> bool;

    /// Start a render.
    fn submit(
        &self,
        request: &VideoRequest,
    ) -> impl std::future::Future<Output = Result<VideoSubmission, ProviderError>> + Send;

    /// Current state of a render. The artifact is the video URL once done.
    fn fetch_status(
        &self,
        kind: JobKind,
        task_id: &str,
    ) -> impl std::future::Future<Output = Result<JobSnapshot, ProviderError>> + Send;

    fn download(
        &self,
        url: &str,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, ProviderError>> + Send;
}

/// Rewrites a prompt before rendering. Must fall back to the input on failure.
pub trait PromptOptimizer: Send + Sync {
    fn optimize(&self, prompt: &str) -> impl std::future::Future<Output = String> + Send;
}

impl<S: ConversationContextStore> PromptOptimizer for ConversationOrchestrator<S> {
    async fn optimize(&self, prompt: &str) -> String {
        self.optimize_prompt(prompt).await
    }
}

/// Text-to-video and image-to-video generation.
pub struct VideoService<V: VideoProvider, O: PromptOptimizer> {
    provider: V,
    optimizer: Arc<O>,
    optimize_prompts: bool,
    poller: AsyncJobPoller,
    submit_policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<V: VideoProvider, O: PromptOptimizer> VideoService<V, O> {
    /// Render-status fetches ride out every 4xx/5xx answer, not only
    /// transient ones.
    pub fn new(provider: V, optimizer: Arc<O>, poller: AsyncJobPoller, submit_policy: RetryPolicy) -> Self {
        Self {
            provider,
            optimizer,
            optimize_prompts: true,
            poller: poller.tolerating(ProviderError::is_error_status),
            submit_policy,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_prompt_optimization(mut self, enabled: bool) -> Self {
        self.optimize_prompts = enabled;
        self
    }

    /// Poll loops end with `Cancelled` once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Render a video. Never fails: problems are reported in the outcome.
    pub async fn generate_video<P>(&self, request: VideoRequest, on_progress: P) -> VideoOutcome
    where
        P: Fn(JobProgress),
    {
        if !self.provider.is_configured() {
            warn!(provider = %self.provider.name(), "video credentials missing");
            return VideoOutcome::failed(CREDENTIALS_MISSING);
        }

        let request = if self.optimize_prompts {
            let prompt = self.optimizer.optimize(request.prompt()).await;
            request.with_prompt(prompt)
        } else {
            request
        };

        info!(provider = %self.provider.name(), kind = %request.kind(), "starting video generation");
        match self.render(&request, on_progress).await {
            Ok(url) => {
                info!(kind = %request.kind(), "video generated");
                VideoOutcome::succeeded(url)
            }
            Err(err) => {
                warn!(kind = %request.kind(), error = %err, "video generation failed");
                VideoOutcome::failed(describe(&err))
            }
        }
    }

    async fn render<P>(&self, request: &VideoRequest, on_progress: P) -> Result<String, BrokerError>
    where
        P: Fn(JobProgress),
    {
        let submission = retry_transient(&self.submit_policy, || self.provider.submit(request)).await?;
        let kind = request.kind();

        match submission.snapshot.status {
            JobStatus::Succeeded => {
                if let Some(url) = submission.snapshot.artifact {
                    return Ok(url);
                }
            }
            JobStatus::Submitted | JobStatus::Processing => {}
            other => {
                let (code, message) = submission
                    .snapshot
                    .error
                    .map(|e| (e.code, e.message))
                    .unwrap_or_else(|| (other.to_string(), format!("unexpected status: {other}")));
                return Err(BrokerError::JobFailed { code, message });
            }
        }

        let task_id = submission.task_id.ok_or_else(|| BrokerError::JobFailed {
            code: "missing_task_id".to_string(),
            message: "video provider returned no task id to track".to_string(),
        })?;
        info!(job_id = %task_id, kind = %kind, "video task submitted");

        let provider = &self.provider;
        let id = task_id.as_str();
        let result = self
            .poller
            .poll_until_terminal(
                self.poller.job(id, kind),
                || async move {
                    let mut snapshot = provider.fetch_status(kind, id).await?;
                    // "Done" without a URL is not done yet.
                    if snapshot.status == JobStatus::Succeeded && snapshot.artifact.is_none() {
                        snapshot.status = JobStatus::Processing;
                    }
                    Ok::<_, ProviderError>(snapshot)
                },
                on_progress,
                &self.cancel,
            )
            .await?;

        result.artifact.ok_or_else(|| BrokerError::JobFailed {
            code: "missing_artifact".to_string(),
            message: "video finished without a URL".to_string(),
        })
    }

    /// Fetch the rendered file. Failures are logged and yield `None`.
    pub async fn download(&self, url: &str) -> Option<Vec<u8>> {
        match self.provider.download(url).await {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(error = %err, "video download failed");
                None
            }
        }
    }
}

fn describe(err: &BrokerError) -> String {
    match err {
        BrokerError::JobFailed { message, .. } => message.clone(),
        BrokerError::JobTimeout { .. } => "timed out waiting for the video".to_string(),
        BrokerError::Cancelled => "video generation was cancelled".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::poller::PollConfig;

    struct StaticOptimizer(&'static str);

    impl PromptOptimizer for StaticOptimizer {
        async fn optimize(&self, _prompt: &str) -> String {
            self.0.to_string()
        }
    }

    #[derive(Default)]
    struct MockVideoProvider {
        unconfigured: bool,
        submissions: Mutex<VecDeque<Result<VideoSubmission, ProviderError>>>,
        statuses: Mutex<VecDeque<Result<JobSnapshot, ProviderError>>>,
        prompts: Mutex<Vec<String>>,
        submit_calls: AtomicU32,
    }

    impl MockVideoProvider {
        fn with_submission(result: Result<VideoSubmission, ProviderError>) -> Self {
            let mock = Self::default();
            mock.submissions.lock().unwrap().push_back(result);
            mock
        }

        fn push_status(&self, result: Result<JobSnapshot, ProviderError>) {
            self.statuses.lock().unwrap().push_back(result);
        }
    }

    impl VideoProvider for MockVideoProvider {
        fn name(&self) -> &str {
            "mock-video"
        }

        fn is_configured(&self) -> bool {
            !self.unconfigured
        }

        async fn submit(&self, request: &VideoRequest) -> Result<VideoSubmission, ProviderError> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.prompt().to_string());
            self.submissions
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Network("no scripted submission".to_string())))
        }

        async fn fetch_status(&self, _kind: JobKind, _task_id: &str) -> Result<JobSnapshot, ProviderError> {
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(JobSnapshot::new(JobStatus::Processing)))
        }

        async fn download(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
            if url.starts_with("https://") {
                Ok(b"mp4".to_vec())
            } else {
                Err(ProviderError::NotFound(url.to_string()))
            }
        }
    }

    fn submitted(task_id: &str) -> VideoSubmission {
        VideoSubmission {
            task_id: Some(task_id.to_string()),
            snapshot: JobSnapshot::new(JobStatus::Submitted),
        }
    }

    fn service(provider: MockVideoProvider) -> VideoService<MockVideoProvider, StaticOptimizer> {
        VideoService::new(
            provider,
            Arc::new(StaticOptimizer("a detailed cat")),
            AsyncJobPoller::new(PollConfig::default()),
            RetryPolicy::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_credentials() {
        let provider = MockVideoProvider {
            unconfigured: true,
            ..Default::default()
        };
        let service = service(provider);

        let outcome = service
            .generate_video(VideoRequest::TextToVideo { prompt: "cat".to_string() }, |_| {})
            .await;

        assert_eq!(outcome, VideoOutcome::failed(CREDENTIALS_MISSING));
        assert_eq!(service.provider.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synchronous_success_skips_polling() {
        let provider = MockVideoProvider::with_submission(Ok(VideoSubmission {
            task_id: None,
            snapshot: JobSnapshot::new(JobStatus::Succeeded).with_artifact("https://cdn/now.mp4"),
        }));
        let service = service(provider);
        let start = tokio::time::Instant::now();

        let outcome = service
            .generate_video(VideoRequest::TextToVideo { prompt: "cat".to_string() }, |_| {})
            .await;

        assert_eq!(outcome, VideoOutcome::succeeded("https://cdn/now.mp4"));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(*service.provider.prompts.lock().unwrap(), vec!["a detailed cat"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_url_available() {
        let provider = MockVideoProvider::with_submission(Ok(submitted("task-1")));
        provider.push_status(Ok(JobSnapshot::new(JobStatus::Processing)));
        provider.push_status(Ok(JobSnapshot::new(JobStatus::Succeeded)));
        provider.push_status(Ok(JobSnapshot::new(JobStatus::Succeeded).with_artifact("https://cdn/v.mp4")));
        let service = service(provider);
        let progress = Mutex::new(Vec::new());

        let outcome = service
            .generate_video(
                VideoRequest::ImageToVideo {
                    image: vec![1, 2, 3],
                    prompt: "cat".to_string(),
                },
                |p| progress.lock().unwrap().push((p.status, p.attempt)),
            )
            .await;

        assert_eq!(outcome, VideoOutcome::succeeded("https://cdn/v.mp4"));
        assert_eq!(
            *progress.lock().unwrap(),
            vec![
                (JobStatus::Processing, 1),
                (JobStatus::Processing, 2),
                (JobStatus::Succeeded, 3)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_errors_do_not_end_polling() {
        let provider = MockVideoProvider::with_submission(Ok(submitted("task-1")));
        provider.push_status(Err(ProviderError::NotFound("task-1".to_string())));
        provider.push_status(Err(ProviderError::Http {
            status: 400,
            message: "bad request".to_string(),
        }));
        provider.push_status(Ok(JobSnapshot::new(JobStatus::Succeeded).with_artifact("https://cdn/v.mp4")));
        let service = service(provider).with_prompt_optimization(false);

        let outcome = service
            .generate_video(VideoRequest::TextToVideo { prompt: "cat".to_string() }, |_| {})
            .await;

        assert_eq!(outcome, VideoOutcome::succeeded("https://cdn/v.mp4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_render_reports_provider_message() {
        let provider = MockVideoProvider::with_submission(Ok(submitted("task-1")));
        provider.push_status(Ok(JobSnapshot::new(JobStatus::Failed)
            .with_error("invalid_prompt", "prompt violates content policy")));
        let service = service(provider).with_prompt_optimization(false);

        let outcome = service
            .generate_video(VideoRequest::TextToVideo { prompt: "cat".to_string() }, |_| {})
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("prompt violates content policy"));
        assert_eq!(*service.provider.prompts.lock().unwrap(), vec!["cat"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_thirty_polls() {
        let provider = MockVideoProvider::with_submission(Ok(submitted("task-1")));
        let service = service(provider);
        let start = tokio::time::Instant::now();

        let outcome = service
            .generate_video(VideoRequest::TextToVideo { prompt: "cat".to_string() }, |_| {})
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("timed out waiting for the video"));
        assert_eq!(start.elapsed(), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_task_id() {
        let provider = MockVideoProvider::with_submission(Ok(VideoSubmission {
            task_id: None,
            snapshot: JobSnapshot::new(JobStatus::Processing),
        }));
        let service = service(provider);

        let outcome = service
            .generate_video(VideoRequest::TextToVideo { prompt: "cat".to_string() }, |_| {})
            .await;

        assert_eq!(outcome.error.as_deref(), Some("video provider returned no task id to track"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_submission_status() {
        let provider = MockVideoProvider::with_submission(Ok(VideoSubmission {
            task_id: Some("task-1".to_string()),
            snapshot: JobSnapshot::new(JobStatus::Failed),
        }));
        let service = service(provider);

        let outcome = service
            .generate_video(VideoRequest::TextToVideo { prompt: "cat".to_string() }, |_| {})
            .await;

        assert_eq!(outcome.error.as_deref(), Some("unexpected status: failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_retries_transient_errors() {
        let provider = MockVideoProvider::with_submission(Err(ProviderError::Http {
            status: 503,
            message: "overloaded".to_string(),
        }));
        provider
            .submissions
            .lock()
            .unwrap()
            .push_back(Ok(VideoSubmission {
                task_id: None,
                snapshot: JobSnapshot::new(JobStatus::Succeeded).with_artifact("https://cdn/v.mp4"),
            }));
        let service = service(provider);

        let outcome = service
            .generate_video(VideoRequest::TextToVideo { prompt: "cat".to_string() }, |_| {})
            .await;

        assert!(outcome.success);
        assert_eq!(service.provider.submit_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_best_effort() {
        let service = service(MockVideoProvider::default());
        assert_eq!(service.download("https://cdn/v.mp4").await, Some(b"mp4".to_vec()));
        assert_eq!(service.download("ftp://nope").await, None);
    }
}
