//! Conversation orchestration.
//!
//! `ConversationOrchestrator::converse` is the single entry point for a user
//! turn: claim the owner, resolve (or mint) the owner's context, lock it, wait
//! out any run still active on it, submit the turn through the retry executor,
//! poll the new run and assemble the reply. Provider and job failures never
//! escape; they become user-facing [`Answer`]s.

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use parley_types::config::BrokerConfig;
use parley_types::conversation::{ActiveContextStatus, Answer, CleanupReport, InputAttachment};
use parley_types::error::{BrokerError, ProviderError};
use parley_types::job::{JobKind, JobResult};
use parley_types::provider::{
    AssistantStatus, FilePurpose, GeneratedImage, ProviderStatus, UserMessage,
};

use crate::assembler::AnswerAssembler;
use crate::lock::ConversationLock;
use crate::poller::{AsyncJobPoller, PollConfig};
use crate::provider::BoxAssistantProvider;
use crate::retry::RetryExecutor;
use crate::store::ConversationContextStore;

/// File extensions accepted as searchable documents (lowercase).
pub const SUPPORTED_DOCUMENT_EXTENSIONS: &[&str] = &[
    "c", "cpp", "css", "csv", "doc", "docx", "gif", "go", "html", "java", "jpeg", "jpg", "js",
    "json", "md", "pdf", "php", "pkl", "png", "pptx", "py", "rb", "tar", "tex", "ts", "txt",
    "webp", "xlsx", "xml", "zip",
];

/// A context is retried at most once after the provider reports it expired.
const MAX_CONTEXT_PASSES: u32 = 2;

pub const BUSY_REPLY: &str =
    "⏳ This conversation is already processing a request. Please wait for it to finish.";
pub const JOB_FAILED_REPLY: &str = "🤖 The assistant could not produce a reply. There may be a problem with the AI provider. Please try again later.";
pub const REQUIRES_ACTION_REPLY: &str =
    "🤖 The assistant requires an additional action. Please rephrase your question.";
pub const TIMEOUT_REPLY: &str =
    "🤖 Waiting for the reply timed out. Please send your message again.";
pub const GENERIC_REPLY: &str = "🤖 Could not get a reply from the AI provider. Please try again later or contact the administrator.";
pub const SHUTTING_DOWN_REPLY: &str = "🤖 The service is shutting down. Please try again shortly.";
pub const UNAVAILABLE_REPLY: &str = "🤖 The assistant is temporarily unavailable. Please try again later or contact the administrator.";

const FILE_TO_JSON_INSTRUCTION: &str = "Convert the contents of this file to JSON format";

/// Assistant ids and run cadence.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub assistant_id: String,
    pub prompt_optimizer_assistant_id: Option<String>,
    pub file_to_json_assistant_id: Option<String>,
    /// Retrieve the assistant before each turn and refuse the turn if it is gone.
    pub verify_assistant: bool,
    pub run_poll: PollConfig,
}

impl OrchestratorConfig {
    pub fn from_broker_config(config: &BrokerConfig) -> Self {
        Self {
            assistant_id: config.provider.assistant_id.clone(),
            prompt_optimizer_assistant_id: config.provider.prompt_optimizer_assistant_id.clone(),
            file_to_json_assistant_id: config.provider.file_to_json_assistant_id.clone(),
            verify_assistant: config.provider.verify_assistant,
            run_poll: PollConfig::from_millis(
                config.polling.run_interval_ms,
                config.polling.run_max_attempts,
            ),
        }
    }
}

/// Entry point for conversational requests.
///
/// Owns the owner -> context cache, the lock tables and the shutdown token;
/// construct once and share behind an `Arc`.
pub struct ConversationOrchestrator<S: ConversationContextStore> {
    store: S,
    executor: RetryExecutor,
    lock: ConversationLock,
    /// Owners with a turn in flight, claimed before their context is resolved.
    owners: ConversationLock,
    contexts: DashMap<i64, String>,
    run_poller: AsyncJobPoller,
    config: OrchestratorConfig,
    shutdown: CancellationToken,
}

impl<S: ConversationContextStore> ConversationOrchestrator<S> {
    pub fn new(store: S, executor: RetryExecutor, config: OrchestratorConfig) -> Self {
        Self {
            store,
            executor,
            lock: ConversationLock::new(),
            owners: ConversationLock::new(),
            contexts: DashMap::new(),
            run_poller: AsyncJobPoller::new(config.run_poll),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn lock(&self) -> &ConversationLock {
        &self.lock
    }

    /// Handle one user turn. Never fails: errors become descriptive answers.
    #[tracing::instrument(
        name = "converse",
        skip(self, message, attachments),
        fields(attachment_count = attachments.len())
    )]
    pub async fn converse(
        &self,
        owner_id: i64,
        message: &str,
        attachments: &[InputAttachment],
    ) -> Answer {
        if self.is_shutting_down() {
            return Answer::text(SHUTTING_DOWN_REPLY);
        }

        match self.try_converse(owner_id, message, attachments).await {
            Ok(answer) => answer,
            Err(err) => {
                match &err {
                    BrokerError::LockContention { context_id } => {
                        info!(owner_id, context_id = %context_id, "rejected turn, context busy");
                    }
                    BrokerError::UnsupportedInput(ext) => {
                        info!(owner_id, extension = %ext, "rejected unsupported attachment");
                    }
                    other => error!(owner_id, error = %other, "conversation turn failed"),
                }
                answer_for_error(&err)
            }
        }
    }

    async fn try_converse(
        &self,
        owner_id: i64,
        message: &str,
        attachments: &[InputAttachment],
    ) -> Result<Answer, BrokerError> {
        validate_attachments(attachments)?;
        let _owner = self.owners.acquire(&owner_key(owner_id), owner_id)?;

        let mut pass = 1;
        loop {
            match self.converse_once(owner_id, message, attachments).await {
                Err(BrokerError::ContextExpired) if pass < MAX_CONTEXT_PASSES => {
                    warn!(owner_id, pass, "conversation context expired, starting a new one");
                    self.forget_context(owner_id).await?;
                    pass += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn converse_once(
        &self,
        owner_id: i64,
        message: &str,
        attachments: &[InputAttachment],
    ) -> Result<Answer, BrokerError> {
        let context_id = self.resolve_context(owner_id).await?;
        let _guard = self.lock.acquire(&context_id, owner_id)?;

        self.drain_stale_run(&context_id).await;

        let assistant_id = self.config.assistant_id.as_str();
        if self.config.verify_assistant {
            self.verify_assistant(assistant_id).await?;
        }

        // Posting the message and starting the run retry separately, so a
        // failed run start never appends the message twice.
        let ctx = context_id.as_str();
        self.executor
            .execute(|provider| async move { send_turn(&provider, ctx, message, attachments).await })
            .await?;
        let run = self
            .executor
            .execute(|provider| async move { provider.create_run(ctx, assistant_id).await })
            .await?;
        info!(owner_id, context_id = %ctx, job_id = %run.id, "run submitted");

        self.poll_run(ctx, &run.id).await?;

        let (reply, provider) = self
            .executor
            .execute(|provider| async move {
                let reply = provider.latest_assistant_message(ctx).await?;
                Ok::<_, ProviderError>((reply, provider))
            })
            .await?;

        match reply {
            Some(reply) => Ok(AnswerAssembler::assemble(&reply, &provider).await),
            None => Err(BrokerError::JobFailed {
                code: "empty_reply".to_string(),
                message: "run completed without an assistant message".to_string(),
            }),
        }
    }

    async fn verify_assistant(&self, assistant_id: &str) -> Result<(), BrokerError> {
        match self
            .executor
            .execute(|provider| async move { provider.retrieve_assistant(assistant_id).await })
            .await
        {
            Ok(info) => {
                debug!(assistant_id, name = ?info.name, "assistant available");
                Ok(())
            }
            Err(err) => Err(BrokerError::AssistantUnavailable(format!("{assistant_id}: {err}"))),
        }
    }

    /// Cached id, then stored id, verified with the provider; otherwise a new
    /// context is minted and persisted.
    async fn resolve_context(&self, owner_id: i64) -> Result<String, BrokerError> {
        let cached = self.contexts.get(&owner_id).map(|entry| entry.value().clone());
        let known = match cached {
            Some(id) => Some(id),
            None => self.store.get_context_id(owner_id).await?,
        };

        if let Some(context_id) = known {
            let ctx = context_id.as_str();
            match self
                .executor
                .execute(|provider| async move { provider.context_exists(ctx).await })
                .await
            {
                Ok(true) => {
                    debug!(owner_id, context_id = %context_id, "reusing conversation context");
                    self.contexts.insert(owner_id, context_id.clone());
                    return Ok(context_id);
                }
                Ok(false) => {
                    warn!(owner_id, context_id = %context_id, "conversation context not found, creating a new one");
                }
                Err(err) => {
                    warn!(owner_id, context_id = %context_id, error = %err, "could not verify conversation context, creating a new one");
                }
            }
        }

        self.create_context(owner_id).await
    }

    async fn create_context(&self, owner_id: i64) -> Result<String, BrokerError> {
        let context_id = self
            .executor
            .execute(|provider| async move { provider.create_context().await })
            .await?;
        self.contexts.insert(owner_id, context_id.clone());
        self.store.set_context_id(owner_id, Some(&context_id)).await?;
        info!(owner_id, context_id = %context_id, "created conversation context");
        Ok(context_id)
    }

    async fn forget_context(&self, owner_id: i64) -> Result<(), BrokerError> {
        self.contexts.remove(&owner_id);
        self.store.set_context_id(owner_id, None).await?;
        Ok(())
    }

    /// Wait for a run left active on the context by an earlier request.
    /// The outcome is only logged.
    async fn drain_stale_run(&self, context_id: &str) {
        let runs = match self
            .executor
            .execute(|provider| async move { provider.list_runs(context_id).await })
            .await
        {
            Ok(runs) => runs,
            Err(err) => {
                warn!(context_id, error = %err, "could not list runs on context");
                return;
            }
        };

        let Some(active) = runs.iter().find(|run| run.snapshot.status.is_unresolved()) else {
            return;
        };

        info!(context_id, job_id = %active.id, "waiting for active run to finish");
        match self.poll_run(context_id, &active.id).await {
            Ok(_) => info!(context_id, job_id = %active.id, "active run finished"),
            Err(err) => warn!(context_id, job_id = %active.id, error = %err, "active run ended without success"),
        }
    }

    async fn poll_run(&self, context_id: &str, run_id: &str) -> Result<JobResult, BrokerError> {
        let monitor = self.executor.monitor();
        self.run_poller
            .poll_until_terminal(
                self.run_poller.job(run_id, JobKind::Run),
                || async move {
                    let selection = monitor.preferred().await;
                    selection.provider.fetch_run(context_id, run_id).await
                },
                |progress| {
                    debug!(
                        job_id = %progress.job_id,
                        status = %progress.status,
                        attempt = progress.attempt,
                        max_attempts = progress.max_attempts,
                        "run progress"
                    );
                },
                &self.shutdown,
            )
            .await
    }

    pub fn provider_status(&self) -> ProviderStatus {
        self.executor.monitor().status()
    }

    pub async fn force_health_recheck(&self) -> bool {
        self.executor.monitor().force_recheck().await
    }

    /// Every cached owner -> context pair with its lock flag.
    pub fn active_contexts_status(&self) -> Vec<ActiveContextStatus> {
        let mut status: Vec<_> = self
            .contexts
            .iter()
            .map(|entry| ActiveContextStatus {
                context_id: entry.value().clone(),
                owner_id: *entry.key(),
                is_locked: self.lock.is_locked(entry.value()),
            })
            .collect();
        status.sort_by_key(|s| s.owner_id);
        status
    }

    /// Load stored mappings into the cache. Returns how many were loaded.
    pub async fn restore_contexts(&self) -> Result<usize, BrokerError> {
        let stored = self.store.list_contexts().await?;
        let count = stored.len();
        for context in stored {
            self.contexts.insert(context.owner_id, context.id);
        }
        debug!(count, "restored conversation contexts");
        Ok(count)
    }

    /// Drop cached contexts the provider no longer knows.
    pub async fn cleanup_corrupted_contexts(&self) -> Result<CleanupReport, BrokerError> {
        let cached: Vec<(i64, String)> = self
            .contexts
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut report = CleanupReport::default();
        for (owner_id, context_id) in cached {
            let ctx = context_id.as_str();
            match self
                .executor
                .execute(|provider| async move { provider.context_exists(ctx).await })
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    warn!(owner_id, context_id = %context_id, "removing corrupted conversation context");
                    self.forget_context(owner_id).await?;
                    report.cleaned += 1;
                }
                Err(err) => {
                    warn!(owner_id, context_id = %context_id, error = %err, "could not verify conversation context");
                    report.errors += 1;
                }
            }
        }

        info!(cleaned = report.cleaned, errors = report.errors, "context cleanup finished");
        Ok(report)
    }

    /// Rewrite a video prompt with the optimizer assistant.
    ///
    /// Returns the original prompt when no optimizer is configured or
    /// anything goes wrong.
    pub async fn optimize_prompt(&self, prompt: &str) -> String {
        let Some(assistant_id) = self.config.prompt_optimizer_assistant_id.as_deref() else {
            return prompt.to_string();
        };

        let instruction = format!(
            "Optimize this prompt for video generation, making it more detailed and better suited to AI video generation: \"{prompt}\""
        );

        match self.one_shot(assistant_id, &instruction, None).await {
            Ok(Some(answer)) if !answer.text.trim().is_empty() => {
                info!(original = %prompt, optimized = %answer.text, "video prompt optimized");
                answer.text
            }
            Ok(_) => {
                warn!("prompt optimizer returned no text, keeping original prompt");
                prompt.to_string()
            }
            Err(err) => {
                warn!(error = %err, "prompt optimization failed, keeping original prompt");
                prompt.to_string()
            }
        }
    }

    /// Convert a file to JSON with the file-conversion assistant.
    ///
    /// The first file the assistant returns is parsed, else its reply text.
    /// Content that is not valid JSON comes back as `{"result": <content>}`.
    pub async fn file_to_json(
        &self,
        filename: &str,
        bytes: &[u8],
        instruction: Option<&str>,
    ) -> Result<serde_json::Value, BrokerError> {
        let assistant_id = self.config.file_to_json_assistant_id.as_deref().ok_or_else(|| {
            BrokerError::AssistantUnavailable("no file conversion assistant configured".to_string())
        })?;

        info!(filename, assistant_id, "converting file to JSON");
        let message = instruction.unwrap_or(FILE_TO_JSON_INSTRUCTION);
        let answer = self
            .one_shot(assistant_id, message, Some((filename, bytes)))
            .await?
            .ok_or_else(|| BrokerError::JobFailed {
                code: "empty_reply".to_string(),
                message: "conversion finished without an assistant message".to_string(),
            })?;

        Ok(parse_json_reply(&answer))
    }

    /// Run `assistant_id` once on a fresh context, optionally with one
    /// searchable document, and assemble its reply.
    async fn one_shot(
        &self,
        assistant_id: &str,
        message: &str,
        document: Option<(&str, &[u8])>,
    ) -> Result<Option<Answer>, BrokerError> {
        let (context_id, run) = self
            .executor
            .execute(|provider| async move {
                let context_id = provider.create_context().await?;
                if let Some((filename, bytes)) = document {
                    let file_id = provider
                        .upload_file(&filename.to_lowercase(), bytes, FilePurpose::Assistants)
                        .await?;
                    provider.attach_file_search(&context_id, &[file_id]).await?;
                }
                provider
                    .append_message(&context_id, &UserMessage::text(message))
                    .await?;
                let run = provider.create_run(&context_id, assistant_id).await?;
                Ok::<_, ProviderError>((context_id, run))
            })
            .await?;

        self.poll_run(&context_id, &run.id).await?;

        let ctx = context_id.as_str();
        let (reply, provider) = self
            .executor
            .execute(|provider| async move {
                let reply = provider.latest_assistant_message(ctx).await?;
                Ok::<_, ProviderError>((reply, provider))
            })
            .await?;

        match reply {
            Some(reply) => Ok(Some(AnswerAssembler::assemble(&reply, &provider).await)),
            None => Ok(None),
        }
    }

    /// Report whether `assistant_id` (default: the conversation assistant)
    /// can be retrieved.
    pub async fn check_assistant_status(&self, assistant_id: Option<&str>) -> AssistantStatus {
        let id = assistant_id.unwrap_or(&self.config.assistant_id);
        match self
            .executor
            .execute(|provider| async move { provider.retrieve_assistant(id).await })
            .await
        {
            Ok(info) => AssistantStatus::Available(info),
            Err(err) => {
                error!(assistant_id = %id, error = %err, "assistant check failed");
                AssistantStatus::Unavailable {
                    id: id.to_string(),
                    error: err.to_string(),
                }
            }
        }
    }

    /// Generate one image. Failures are logged and yield `None`.
    pub async fn generate_image(&self, prompt: &str) -> Option<GeneratedImage> {
        match self
            .executor
            .execute(|provider| async move { provider.generate_image(prompt).await })
            .await
        {
            Ok(image) => Some(image),
            Err(err) => {
                error!(error = %err, "image generation failed");
                None
            }
        }
    }

    /// Render a new image from a source photo and a prompt. Failures are
    /// logged and yield `None`.
    pub async fn edit_image(&self, image: &[u8], prompt: &str) -> Option<GeneratedImage> {
        match self
            .executor
            .execute(|provider| async move { provider.edit_image(image, prompt).await })
            .await
        {
            Ok(image) => Some(image),
            Err(err) => {
                error!(error = %err, "image edit failed");
                None
            }
        }
    }

    /// Stop accepting turns and cancel every poll loop.
    ///
    /// Provider calls already in flight are not aborted.
    pub fn shutdown(&self) {
        info!("conversation orchestrator shutting down");
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// Upload attachments and append the user message.
async fn send_turn(
    provider: &Arc<BoxAssistantProvider>,
    context_id: &str,
    text: &str,
    attachments: &[InputAttachment],
) -> Result<(), ProviderError> {
    let mut message = UserMessage::text(text);
    let mut documents = Vec::new();

    for attachment in attachments {
        match attachment {
            InputAttachment::Image { bytes } => {
                let file_id = provider
                    .upload_file(attachment.filename(), bytes, FilePurpose::Vision)
                    .await?;
                message.image_file_ids.push(file_id);
            }
            InputAttachment::Document { filename, bytes } => {
                let file_id = provider
                    .upload_file(&filename.to_lowercase(), bytes, FilePurpose::Assistants)
                    .await?;
                documents.push(file_id);
            }
        }
    }

    if !documents.is_empty() {
        provider.attach_file_search(context_id, &documents).await?;
    }
    provider.append_message(context_id, &message).await
}

fn owner_key(owner_id: i64) -> String {
    format!("owner:{owner_id}")
}

/// JSON from the first returned file, else from the reply text.
pub fn parse_json_reply(answer: &Answer) -> serde_json::Value {
    let raw = match answer.attachments.first() {
        Some(file) => String::from_utf8_lossy(&file.bytes).into_owned(),
        None => answer.text.clone(),
    };
    serde_json::from_str(&raw).unwrap_or_else(|err| {
        warn!(error = %err, "assistant reply is not valid JSON, wrapping it");
        serde_json::json!({ "result": raw })
    })
}

/// Lowercased text after the last dot (the whole name if there is none).
pub fn document_extension(filename: &str) -> String {
    filename
        .to_lowercase()
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn validate_attachments(attachments: &[InputAttachment]) -> Result<(), BrokerError> {
    for attachment in attachments {
        if let InputAttachment::Document { filename, .. } = attachment {
            let extension = document_extension(filename);
            if !SUPPORTED_DOCUMENT_EXTENSIONS.contains(&extension.as_str()) {
                return Err(BrokerError::UnsupportedInput(extension));
            }
        }
    }
    Ok(())
}

/// Map an orchestration failure to the reply shown to the user.
pub fn answer_for_error(err: &BrokerError) -> Answer {
    let text = match err {
        BrokerError::LockContention { .. } => BUSY_REPLY.to_string(),
        BrokerError::JobFailed { code, .. } if code == "expired" => TIMEOUT_REPLY.to_string(),
        BrokerError::JobFailed { .. } => JOB_FAILED_REPLY.to_string(),
        BrokerError::JobTimeout { .. } => TIMEOUT_REPLY.to_string(),
        BrokerError::RequiresAction(_) => REQUIRES_ACTION_REPLY.to_string(),
        BrokerError::UnsupportedInput(extension) => format!(
            "❌ Unsupported file format: {extension}. Supported formats: {}",
            SUPPORTED_DOCUMENT_EXTENSIONS.join(", ")
        ),
        BrokerError::Cancelled => SHUTTING_DOWN_REPLY.to_string(),
        BrokerError::AssistantUnavailable(_) => UNAVAILABLE_REPLY.to_string(),
        _ => GENERIC_REPLY.to_string(),
    };
    Answer::text(text)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parley_types::job::{JobSnapshot, JobStatus};
    use parley_types::provider::{Annotation, ContentPart, RunInfo};

    use super::*;
    use crate::provider::ProviderHealthMonitor;
    use crate::provider::health::DEFAULT_CHECK_INTERVAL;
    use crate::retry::RetryPolicy;
    use crate::store::InMemoryContextStore;
    use crate::testing::MockAssistantProvider;

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            assistant_id: "asst_main".to_string(),
            prompt_optimizer_assistant_id: None,
            file_to_json_assistant_id: Some("asst_json".to_string()),
            verify_assistant: true,
            run_poll: PollConfig::from_millis(1000, 300),
        }
    }

    fn orchestrator_with(
        mock: &MockAssistantProvider,
        config: OrchestratorConfig,
    ) -> ConversationOrchestrator<InMemoryContextStore> {
        let monitor = ProviderHealthMonitor::new(
            BoxAssistantProvider::new(mock.clone()),
            BoxAssistantProvider::new(mock.clone()),
            DEFAULT_CHECK_INTERVAL,
        );
        let executor = RetryExecutor::new(Arc::new(monitor), RetryPolicy::default());
        ConversationOrchestrator::new(InMemoryContextStore::new(), executor, config)
    }

    fn orchestrator(mock: &MockAssistantProvider) -> ConversationOrchestrator<InMemoryContextStore> {
        orchestrator_with(mock, config())
    }

    #[tokio::test(start_paused = true)]
    async fn test_creates_then_reuses_context() {
        let mock = MockAssistantProvider::new("openai");
        mock.set_reply_text("Hello, 42!");
        let orchestrator = orchestrator(&mock);

        let first = orchestrator.converse(42, "hi", &[]).await;
        assert_eq!(first.text, "Hello, 42!");
        assert!(first.attachments.is_empty());
        let stored = orchestrator.store().get_context_id(42).await.unwrap();
        assert_eq!(stored.as_deref(), Some("thread_1"));

        let second = orchestrator.converse(42, "again", &[]).await;
        assert_eq!(second.text, "Hello, 42!");
        assert_eq!(mock.count("create_context"), 1);

        let messages = mock.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|(ctx, _)| ctx == "thread_1"));
        assert_eq!(orchestrator.lock().active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_turn_on_same_context_is_rejected() {
        let mock = MockAssistantProvider::new("openai");
        mock.set_reply_text("done");
        mock.add_context("thread_seed");
        let orchestrator = orchestrator(&mock);
        orchestrator
            .store()
            .set_context_id(42, Some("thread_seed"))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            orchestrator.converse(42, "first", &[]),
            orchestrator.converse(42, "second", &[]),
        );

        let busy = [&a, &b].iter().filter(|answer| answer.text == BUSY_REPLY).count();
        assert_eq!(busy, 1);
        assert!(a.text == "done" || b.text == "done");
        assert_eq!(mock.count("create_run"), 1);
        assert_eq!(orchestrator.lock().active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_released_after_failure() {
        let mock = MockAssistantProvider::new("openai");
        mock.set_reply_text("recovered");
        mock.push_create_run_error(ProviderError::AuthenticationFailed);
        let orchestrator = orchestrator(&mock);

        let failed = orchestrator.converse(42, "hi", &[]).await;
        assert_eq!(failed.text, GENERIC_REPLY);
        assert_eq!(orchestrator.lock().active_count(), 0);

        let ok = orchestrator.converse(42, "hi", &[]).await;
        assert_eq!(ok.text, "recovered");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_context_is_replaced_once() {
        let mock = MockAssistantProvider::new("openai");
        mock.set_reply_text("fresh start");
        mock.push_append_error(ProviderError::ContextExpired("vector store expired".to_string()));
        let orchestrator = orchestrator(&mock);

        let answer = orchestrator.converse(42, "hi", &[]).await;
        assert_eq!(answer.text, "fresh start");
        assert_eq!(mock.count("create_context"), 2);

        let stored = orchestrator.store().get_context_id(42).await.unwrap().unwrap();
        assert_ne!(stored, "thread_1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_context_twice_gives_up() {
        let mock = MockAssistantProvider::new("openai");
        mock.push_append_error(ProviderError::ContextExpired("gone".to_string()));
        mock.push_append_error(ProviderError::ContextExpired("gone again".to_string()));
        let orchestrator = orchestrator(&mock);

        let answer = orchestrator.converse(42, "hi", &[]).await;
        assert_eq!(answer.text, GENERIC_REPLY);
        assert_eq!(mock.count("create_context"), 2);
        assert_eq!(mock.count("create_run"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_run_is_drained_before_submit() {
        let mock = MockAssistantProvider::new("openai");
        mock.set_reply_text("ok");
        mock.set_runs(vec![RunInfo {
            id: "run_stale".to_string(),
            snapshot: JobSnapshot::new(JobStatus::Processing),
        }]);
        mock.push_run_status(Ok(JobSnapshot::new(JobStatus::Processing)));
        mock.push_run_status(Ok(JobSnapshot::new(JobStatus::Failed)));
        let orchestrator = orchestrator(&mock);

        let answer = orchestrator.converse(42, "hi", &[]).await;
        assert_eq!(answer.text, "ok");

        let calls = mock.calls();
        let first_append = calls.iter().position(|c| c == "append_message").unwrap();
        let stale_polls = calls[..first_append]
            .iter()
            .filter(|c| c.as_str() == "fetch_run")
            .count();
        assert_eq!(stale_polls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_document_rejected_before_network() {
        let mock = MockAssistantProvider::new("openai");
        let orchestrator = orchestrator(&mock);

        let answer = orchestrator
            .converse(
                42,
                "summarize",
                &[InputAttachment::Document {
                    filename: "setup.EXE".to_string(),
                    bytes: vec![0],
                }],
            )
            .await;

        assert!(answer.text.starts_with("❌ Unsupported file format: exe. Supported formats: c, cpp"));
        assert!(mock.calls().is_empty());
        assert_eq!(mock.probe_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attachments_are_uploaded() {
        let mock = MockAssistantProvider::new("openai");
        mock.set_reply_text("read it");
        let orchestrator = orchestrator(&mock);

        let answer = orchestrator
            .converse(
                42,
                "what is in these?",
                &[
                    InputAttachment::Document {
                        filename: "Report.PDF".to_string(),
                        bytes: vec![1, 2],
                    },
                    InputAttachment::Image { bytes: vec![3] },
                ],
            )
            .await;
        assert_eq!(answer.text, "read it");

        let uploads = mock.uploads();
        assert_eq!(uploads[0], ("report.pdf".to_string(), FilePurpose::Assistants));
        assert_eq!(uploads[1], ("image.png".to_string(), FilePurpose::Vision));

        let search = mock.file_search();
        assert_eq!(search.len(), 1);
        assert_eq!(search[0].1.len(), 1);

        let (_, message) = &mock.messages()[0];
        assert_eq!(message.image_file_ids.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_maps_to_reply() {
        let mock = MockAssistantProvider::new("openai");
        mock.push_run_status(Ok(JobSnapshot::new(JobStatus::Failed)
            .with_error("rate_limit_exceeded", "quota exhausted")));
        let orchestrator = orchestrator(&mock);

        let answer = orchestrator.converse(42, "hi", &[]).await;
        assert_eq!(answer.text, JOB_FAILED_REPLY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requires_action_maps_to_reply() {
        let mock = MockAssistantProvider::new("openai");
        let mut snapshot = JobSnapshot::new(JobStatus::RequiresAction);
        snapshot.required_action = Some("submit_tool_outputs".to_string());
        mock.push_run_status(Ok(snapshot));
        let orchestrator = orchestrator(&mock);

        let answer = orchestrator.converse(42, "hi", &[]).await;
        assert_eq!(answer.text, REQUIRES_ACTION_REPLY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_timeout_maps_to_reply() {
        let mock = MockAssistantProvider::new("openai");
        for _ in 0..3 {
            mock.push_run_status(Ok(JobSnapshot::new(JobStatus::Processing)));
        }
        let mut cfg = config();
        cfg.run_poll = PollConfig::from_millis(1000, 3);
        let orchestrator = orchestrator_with(&mock, cfg);

        let start = tokio::time::Instant::now();
        let answer = orchestrator.converse(42, "hi", &[]).await;
        assert_eq!(answer.text, TIMEOUT_REPLY);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_with_generated_file() {
        let mock = MockAssistantProvider::new("openai");
        mock.add_file("file-chart", Some("chart.png"), b"png-bytes");
        mock.set_reply(parley_types::provider::AssistantMessage {
            id: "msg_1".to_string(),
            content: vec![ContentPart::Text {
                value: "Chart attached.".to_string(),
                annotations: vec![Annotation::FilePath {
                    file_id: "file-chart".to_string(),
                }],
            }],
            attachment_file_ids: vec![],
        });
        let orchestrator = orchestrator(&mock);

        let answer = orchestrator.converse(42, "plot it", &[]).await;
        assert_eq!(answer.text, "Chart attached.");
        assert_eq!(answer.attachments.len(), 1);
        assert_eq!(answer.attachments[0].filename, "chart.png");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_removes_unknown_contexts() {
        let mock = MockAssistantProvider::new("openai");
        mock.set_reply_text("ok");
        let orchestrator = orchestrator(&mock);

        orchestrator.converse(1, "hi", &[]).await;
        orchestrator.converse(2, "hi", &[]).await;
        let gone = orchestrator.store().get_context_id(2).await.unwrap().unwrap();
        mock.forget_context(&gone);

        let report = orchestrator.cleanup_corrupted_contexts().await.unwrap();
        assert_eq!(report, CleanupReport { cleaned: 1, errors: 0 });

        let status = orchestrator.active_contexts_status();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].owner_id, 1);
        assert!(!status[0].is_locked);
        assert_eq!(orchestrator.store().get_context_id(2).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_contexts_warms_cache() {
        let mock = MockAssistantProvider::new("openai");
        let orchestrator = orchestrator(&mock);
        orchestrator
            .store()
            .set_context_id(9, Some("thread_9"))
            .await
            .unwrap();

        assert_eq!(orchestrator.restore_contexts().await.unwrap(), 1);
        assert_eq!(orchestrator.active_contexts_status()[0].context_id, "thread_9");
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimize_prompt_without_optimizer_keeps_prompt() {
        let mock = MockAssistantProvider::new("openai");
        let orchestrator = orchestrator(&mock);

        assert_eq!(orchestrator.optimize_prompt("a cat").await, "a cat");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimize_prompt_uses_fresh_context() {
        let mock = MockAssistantProvider::new("openai");
        mock.set_reply_text("A fluffy cat walking slowly through tall grass at sunset");
        let mut cfg = config();
        cfg.prompt_optimizer_assistant_id = Some("asst_optimizer".to_string());
        let orchestrator = orchestrator_with(&mock, cfg);

        let optimized = orchestrator.optimize_prompt("a cat").await;
        assert_eq!(optimized, "A fluffy cat walking slowly through tall grass at sunset");
        assert_eq!(mock.count("create_context"), 1);
        assert!(orchestrator.active_contexts_status().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimize_prompt_failure_keeps_prompt() {
        let mock = MockAssistantProvider::new("openai");
        mock.push_run_status(Ok(JobSnapshot::new(JobStatus::Failed)));
        let mut cfg = config();
        cfg.prompt_optimizer_assistant_id = Some("asst_optimizer".to_string());
        let orchestrator = orchestrator_with(&mock, cfg);

        assert_eq!(orchestrator.optimize_prompt("a cat").await, "a cat");
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_image() {
        let mock = MockAssistantProvider::new("openai");
        mock.set_image(Ok(GeneratedImage::Bytes(vec![1, 2, 3])));
        let orchestrator = orchestrator(&mock);
        assert_eq!(
            orchestrator.generate_image("a cat").await,
            Some(GeneratedImage::Bytes(vec![1, 2, 3]))
        );

        mock.set_image(Err(ProviderError::AuthenticationFailed));
        assert_eq!(orchestrator.generate_image("a cat").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_new_turns() {
        let mock = MockAssistantProvider::new("openai");
        let orchestrator = orchestrator(&mock);

        orchestrator.shutdown();
        let answer = orchestrator.converse(42, "hi", &[]).await;
        assert_eq!(answer.text, SHUTTING_DOWN_REPLY);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_status_and_recheck() {
        let mock = MockAssistantProvider::new("openai");
        let orchestrator = orchestrator(&mock);

        assert!(orchestrator.provider_status().is_primary_available);
        mock.set_probe_ok(false);
        assert!(!orchestrator.force_health_recheck().await);
        assert!(!orchestrator.provider_status().is_primary_available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_first_turns_for_one_owner() {
        let mock = MockAssistantProvider::new("openai");
        mock.set_reply_text("welcome");
        let orchestrator = orchestrator(&mock);

        let (a, b) = tokio::join!(
            orchestrator.converse(42, "first", &[]),
            orchestrator.converse(42, "second", &[]),
        );

        let busy = [&a, &b].iter().filter(|answer| answer.text == BUSY_REPLY).count();
        assert_eq!(busy, 1);
        assert!(a.text == "welcome" || b.text == "welcome");
        assert_eq!(mock.count("create_context"), 1);
        assert_eq!(mock.count("create_run"), 1);
        assert_eq!(orchestrator.active_contexts_status().len(), 1);
        assert_eq!(orchestrator.lock().active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_locked_while_turn_in_flight() {
        let mock = MockAssistantProvider::new("openai");
        mock.set_reply_text("finally");
        for _ in 0..3 {
            mock.push_run_status(Ok(JobSnapshot::new(JobStatus::Processing)));
        }
        let orchestrator = orchestrator(&mock);

        let observe = async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            orchestrator.active_contexts_status()
        };
        let (answer, during) = tokio::join!(orchestrator.converse(42, "hi", &[]), observe);

        assert_eq!(answer.text, "finally");
        assert_eq!(during.len(), 1);
        assert_eq!(during[0].owner_id, 42);
        assert!(during[0].is_locked);
        assert!(!orchestrator.active_contexts_status()[0].is_locked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_start_retry_keeps_single_message() {
        let mock = MockAssistantProvider::new("openai");
        mock.set_reply_text("got it");
        mock.push_create_run_error(ProviderError::Network("connection reset".to_string()));
        let orchestrator = orchestrator(&mock);

        let answer = orchestrator
            .converse(
                42,
                "read this",
                &[InputAttachment::Document {
                    filename: "notes.txt".to_string(),
                    bytes: b"hello".to_vec(),
                }],
            )
            .await;

        assert_eq!(answer.text, "got it");
        assert_eq!(mock.count("create_run"), 2);
        assert_eq!(mock.messages().len(), 1);
        assert_eq!(mock.uploads().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_assistant_refuses_turn() {
        let mock = MockAssistantProvider::new("openai");
        mock.set_reply_text("unreachable");
        mock.set_assistant_error(Some(ProviderError::NotFound("asst_main".to_string())));
        let orchestrator = orchestrator(&mock);

        let answer = orchestrator.converse(42, "hi", &[]).await;
        assert_eq!(answer.text, UNAVAILABLE_REPLY);
        assert_eq!(mock.count("append_message"), 0);
        assert_eq!(mock.count("create_run"), 0);
        assert_eq!(orchestrator.lock().active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_skips_assistant_check_when_disabled() {
        let mock = MockAssistantProvider::new("openai");
        mock.set_reply_text("ok");
        mock.set_assistant_error(Some(ProviderError::NotFound("asst_main".to_string())));
        let mut cfg = config();
        cfg.verify_assistant = false;
        let orchestrator = orchestrator_with(&mock, cfg);

        assert_eq!(orchestrator.converse(42, "hi", &[]).await.text, "ok");
        assert_eq!(mock.count("retrieve_assistant"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_assistant_status() {
        let mock = MockAssistantProvider::new("openai");
        let orchestrator = orchestrator(&mock);

        match orchestrator.check_assistant_status(None).await {
            AssistantStatus::Available(info) => {
                assert_eq!(info.id, "asst_main");
                assert_eq!(info.name.as_deref(), Some("Mock assistant"));
            }
            other => panic!("expected available, got {other:?}"),
        }

        mock.set_assistant_error(Some(ProviderError::NotFound("asst_other".to_string())));
        match orchestrator.check_assistant_status(Some("asst_other")).await {
            AssistantStatus::Unavailable { id, error } => {
                assert_eq!(id, "asst_other");
                assert!(error.contains("asst_other"));
            }
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_to_json_parses_reply_text() {
        let mock = MockAssistantProvider::new("openai");
        mock.set_reply_text(r#"{"rows": 2}"#);
        let orchestrator = orchestrator(&mock);

        let value = orchestrator
            .file_to_json("Data.CSV", b"a,b\n1,2\n3,4", None)
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!({ "rows": 2 }));

        assert_eq!(mock.uploads(), vec![("data.csv".to_string(), FilePurpose::Assistants)]);
        assert_eq!(mock.file_search().len(), 1);
        let (_, message) = &mock.messages()[0];
        assert_eq!(message.text, FILE_TO_JSON_INSTRUCTION);
        assert!(orchestrator.active_contexts_status().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_to_json_prefers_returned_file() {
        let mock = MockAssistantProvider::new("openai");
        mock.add_file("file-out", Some("out.json"), br#"[1, 2, 3]"#);
        mock.set_reply(parley_types::provider::AssistantMessage {
            id: "msg_1".to_string(),
            content: vec![ContentPart::Text {
                value: "Here is your file.".to_string(),
                annotations: vec![],
            }],
            attachment_file_ids: vec!["file-out".to_string()],
        });
        let orchestrator = orchestrator(&mock);

        let value = orchestrator
            .file_to_json("report.pdf", b"%PDF", Some("Extract the table"))
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!([1, 2, 3]));
        assert_eq!(mock.messages()[0].1.text, "Extract the table");
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_to_json_wraps_plain_text() {
        let mock = MockAssistantProvider::new("openai");
        mock.set_reply_text("Sorry, the file is empty.");
        let orchestrator = orchestrator(&mock);

        let value = orchestrator.file_to_json("empty.txt", b"", None).await.unwrap();
        assert_eq!(value, serde_json::json!({ "result": "Sorry, the file is empty." }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_to_json_without_assistant() {
        let mock = MockAssistantProvider::new("openai");
        let mut cfg = config();
        cfg.file_to_json_assistant_id = None;
        let orchestrator = orchestrator_with(&mock, cfg);

        let err = orchestrator.file_to_json("a.txt", b"x", None).await.unwrap_err();
        assert!(matches!(err, BrokerError::AssistantUnavailable(_)));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_image() {
        let mock = MockAssistantProvider::new("openai");
        let orchestrator = orchestrator(&mock);

        let edited = orchestrator.edit_image(b"photo", "make it a painting").await;
        assert_eq!(
            edited,
            Some(GeneratedImage::Url("https://mock.invalid/edited.png".to_string()))
        );
        assert_eq!(mock.edits(), vec![(b"photo".to_vec(), "make it a painting".to_string())]);

        mock.set_image(Err(ProviderError::AuthenticationFailed));
        assert_eq!(orchestrator.edit_image(b"photo", "again").await, None);
    }

    #[test]
    fn test_document_extension() {
        assert_eq!(document_extension("Report.PDF"), "pdf");
        assert_eq!(document_extension("archive.tar.gz"), "gz");
        assert_eq!(document_extension("README"), "readme");
    }
}
