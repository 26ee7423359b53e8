//! AssistantProvider trait definition.
//!
//! The subset of an assistants-style API the broker needs: conversation
//! contexts, messages, runs and stored files. Primary and fallback endpoints
//! are two instances of the same implementation with different base URLs.

use parley_types::error::ProviderError;
use parley_types::job::JobSnapshot;
use parley_types::provider::{
    AssistantInfo, AssistantMessage, FileMeta, FilePurpose, GeneratedImage, RunInfo, UserMessage,
};

/// Trait for assistant provider backends.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). Implementations
/// live in parley-infra (e.g., `OpenAiAssistantProvider`).
pub trait AssistantProvider: Send + Sync {
    /// Human-readable provider name (e.g., "openai-primary").
    fn name(&self) -> &str;

    /// Endpoint this instance talks to.
    fn base_url(&self) -> &str;

    /// Cheap reachability check (list models).
    fn probe(&self) -> impl std::future::Future<Output = Result<(), ProviderError>> + Send;

    /// Fetch an assistant definition. Fails when the assistant is gone.
    fn retrieve_assistant(
        &self,
        assistant_id: &str,
    ) -> impl std::future::Future<Output = Result<AssistantInfo, ProviderError>> + Send;

    /// Create a new empty conversation context. Returns its id.
    fn create_context(
        &self,
    ) -> impl std::future::Future<Output = Result<String, ProviderError>> + Send;

    /// Whether the provider still knows this context.
    fn context_exists(
        &self,
        context_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, ProviderError>> + Send;

    /// Append a user message to a context.
    fn append_message(
        &self,
        context_id: &str,
        message: &UserMessage,
    ) -> impl std::future::Future<Output = Result<(), ProviderError>> + Send;

    /// Upload a file. Returns the provider file id.
    fn upload_file(
        &self,
        filename: &str,
        bytes: &[u8],
        purpose: FilePurpose,
    ) -> impl std::future::Future<Output = Result<String, ProviderError>> + Send;

    /// Make uploaded files searchable by the assistant within a context.
    fn attach_file_search(
        &self,
        context_id: &str,
        file_ids: &[String],
    ) -> impl std::future::Future<Output = Result<(), ProviderError>> + Send;

    /// Start a run of `assistant_id` over the context.
    fn create_run(
        &self,
        context_id: &str,
        assistant_id: &str,
    ) -> impl std::future::Future<Output = Result<RunInfo, ProviderError>> + Send;

    /// Current state of a run.
    fn fetch_run(
        &self,
        context_id: &str,
        run_id: &str,
    ) -> impl std::future::Future<Output = Result<JobSnapshot, ProviderError>> + Send;

    /// Recent runs on a context, newest first.
    fn list_runs(
        &self,
        context_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<RunInfo>, ProviderError>> + Send;

    /// Newest assistant message on a context, if any.
    fn latest_assistant_message(
        &self,
        context_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<AssistantMessage>, ProviderError>> + Send;

    fn file_meta(
        &self,
        file_id: &str,
    ) -> impl std::future::Future<Output = Result<FileMeta, ProviderError>> + Send;

    fn file_content(
        &self,
        file_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, ProviderError>> + Send;

    /// Render a single image from a text prompt.
    fn generate_image(
        &self,
        prompt: &str,
    ) -> impl std::future::Future<Output = Result<GeneratedImage, ProviderError>> + Send;

    /// Render a single image from a source photo and a text prompt.
    fn edit_image(
        &self,
        image: &[u8],
        prompt: &str,
    ) -> impl std::future::Future<Output = Result<GeneratedImage, ProviderError>> + Send;
}
