//! BoxAssistantProvider -- object-safe dynamic dispatch wrapper for AssistantProvider.
//!
//! 1. Define an object-safe `AssistantProviderDyn` trait with boxed futures
//! 2. Blanket-impl `AssistantProviderDyn` for all `T: AssistantProvider`
//! 3. `BoxAssistantProvider` wraps `Box<dyn AssistantProviderDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use parley_types::error::ProviderError;
use parley_types::job::JobSnapshot;
use parley_types::provider::{
    AssistantInfo, AssistantMessage, FileMeta, FilePurpose, GeneratedImage, RunInfo, UserMessage,
};

use super::provider::AssistantProvider;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Object-safe version of [`AssistantProvider`] with boxed futures.
pub trait AssistantProviderDyn: Send + Sync {
    fn name(&self) -> &str;

    fn base_url(&self) -> &str;

    fn probe_boxed(&self) -> BoxFuture<'_, ()>;

    fn retrieve_assistant_boxed<'a>(&'a self, assistant_id: &'a str) -> BoxFuture<'a, AssistantInfo>;

    fn create_context_boxed(&self) -> BoxFuture<'_, String>;

    fn context_exists_boxed<'a>(&'a self, context_id: &'a str) -> BoxFuture<'a, bool>;

    fn append_message_boxed<'a>(
        &'a self,
        context_id: &'a str,
        message: &'a UserMessage,
    ) -> BoxFuture<'a, ()>;

    fn upload_file_boxed<'a>(
        &'a self,
        filename: &'a str,
        bytes: &'a [u8],
        purpose: FilePurpose,
    ) -> BoxFuture<'a, String>;

    fn attach_file_search_boxed<'a>(
        &'a self,
        context_id: &'a str,
        file_ids: &'a [String],
    ) -> BoxFuture<'a, ()>;

    fn create_run_boxed<'a>(
        &'a self,
        context_id: &'a str,
        assistant_id: &'a str,
    ) -> BoxFuture<'a, RunInfo>;

    fn fetch_run_boxed<'a>(&'a self, context_id: &'a str, run_id: &'a str)
    -> BoxFuture<'a, JobSnapshot>;

    fn list_runs_boxed<'a>(&'a self, context_id: &'a str) -> BoxFuture<'a, Vec<RunInfo>>;

    fn latest_assistant_message_boxed<'a>(
        &'a self,
        context_id: &'a str,
    ) -> BoxFuture<'a, Option<AssistantMessage>>;

    fn file_meta_boxed<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, FileMeta>;

    fn file_content_boxed<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, Vec<u8>>;

    fn generate_image_boxed<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, GeneratedImage>;

    fn edit_image_boxed<'a>(&'a self, image: &'a [u8], prompt: &'a str)
    -> BoxFuture<'a, GeneratedImage>;
}

/// Blanket implementation: any `AssistantProvider` automatically implements
/// `AssistantProviderDyn`.
impl<T: AssistantProvider> AssistantProviderDyn for T {
    fn name(&self) -> &str {
        AssistantProvider::name(self)
    }

    fn base_url(&self) -> &str {
        AssistantProvider::base_url(self)
    }

    fn probe_boxed(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.probe())
    }

    fn retrieve_assistant_boxed<'a>(&'a self, assistant_id: &'a str) -> BoxFuture<'a, AssistantInfo> {
        Box::pin(self.retrieve_assistant(assistant_id))
    }

    fn create_context_boxed(&self) -> BoxFuture<'_, String> {
        Box::pin(self.create_context())
    }

    fn context_exists_boxed<'a>(&'a self, context_id: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(self.context_exists(context_id))
    }

    fn append_message_boxed<'a>(
        &'a self,
        context_id: &'a str,
        message: &'a UserMessage,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.append_message(context_id, message))
    }

    fn upload_file_boxed<'a>(
        &'a self,
        filename: &'a str,
        bytes: &'a [u8],
        purpose: FilePurpose,
    ) -> BoxFuture<'a, String> {
        Box::pin(self.upload_file(filename, bytes, purpose))
    }

    fn attach_file_search_boxed<'a>(
        &'a self,
        context_id: &'a str,
        file_ids: &'a [String],
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.attach_file_search(context_id, file_ids))
    }

    fn create_run_boxed<'a>(
        &'a self,
        context_id: &'a str,
        assistant_id: &'a str,
    ) -> BoxFuture<'a, RunInfo> {
        Box::pin(self.create_run(context_id, assistant_id))
    }

    fn fetch_run_boxed<'a>(
        &'a self,
        context_id: &'a str,
        run_id: &'a str,
    ) -> BoxFuture<'a, JobSnapshot> {
        Box::pin(self.fetch_run(context_id, run_id))
    }

    fn list_runs_boxed<'a>(&'a self, context_id: &'a str) -> BoxFuture<'a, Vec<RunInfo>> {
        Box::pin(self.list_runs(context_id))
    }

    fn latest_assistant_message_boxed<'a>(
        &'a self,
        context_id: &'a str,
    ) -> BoxFuture<'a, Option<AssistantMessage>> {
        Box::pin(self.latest_assistant_message(context_id))
    }

    fn file_meta_boxed<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, FileMeta> {
        Box::pin(self.file_meta(file_id))
    }

    fn file_content_boxed<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, Vec<u8>> {
        Box::pin(self.file_content(file_id))
    }

    fn generate_image_boxed<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, GeneratedImage> {
        Box::pin(self.generate_image(prompt))
    }

    fn edit_image_boxed<'a>(
        &'a self,
        image: &'a [u8],
        prompt: &'a str,
    ) -> BoxFuture<'a, GeneratedImage> {
        Box::pin(self.edit_image(image, prompt))
    }
}

/// Type-erased assistant provider.
///
/// Since `AssistantProvider` uses RPITIT, it cannot be used as a trait object
/// directly. The health monitor holds two of these (primary and fallback) and
/// hands them out behind `Arc`.
pub struct BoxAssistantProvider {
    inner: Box<dyn AssistantProviderDyn + Send + Sync>,
}

impl BoxAssistantProvider {
    /// Wrap a concrete `AssistantProvider` in a type-erased box.
    pub fn new<T: AssistantProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn base_url(&self) -> &str {
        self.inner.base_url()
    }

    pub async fn probe(&self) -> Result<(), ProviderError> {
        self.inner.probe_boxed().await
    }

    pub async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantInfo, ProviderError> {
        self.inner.retrieve_assistant_boxed(assistant_id).await
    }

    pub async fn create_context(&self) -> Result<String, ProviderError> {
        self.inner.create_context_boxed().await
    }

    pub async fn context_exists(&self, context_id: &str) -> Result<bool, ProviderError> {
        self.inner.context_exists_boxed(context_id).await
    }

    pub async fn append_message(
        &self,
        context_id: &str,
        message: &UserMessage,
    ) -> Result<(), ProviderError> {
        self.inner.append_message_boxed(context_id, message).await
    }

    pub async fn upload_file(
        &self,
        filename: &str,
        bytes: &[u8],
        purpose: FilePurpose,
    ) -> Result<String, ProviderError> {
        self.inner.upload_file_boxed(filename, bytes, purpose).await
    }

    pub async fn attach_file_search(
        &self,
        context_id: &str,
        file_ids: &[String],
    ) -> Result<(), ProviderError> {
        self.inner.attach_file_search_boxed(context_id, file_ids).await
    }

    pub async fn create_run(
        &self,
        context_id: &str,
        assistant_id: &str,
    ) -> Result<RunInfo, ProviderError> {
        self.inner.create_run_boxed(context_id, assistant_id).await
    }

    pub async fn fetch_run(
        &self,
        context_id: &str,
        run_id: &str,
    ) -> Result<JobSnapshot, ProviderError> {
        self.inner.fetch_run_boxed(context_id, run_id).await
    }

    pub async fn list_runs(&self, context_id: &str) -> Result<Vec<RunInfo>, ProviderError> {
        self.inner.list_runs_boxed(context_id).await
    }

    pub async fn latest_assistant_message(
        &self,
        context_id: &str,
    ) -> Result<Option<AssistantMessage>, ProviderError> {
        self.inner.latest_assistant_message_boxed(context_id).await
    }

    pub async fn file_meta(&self, file_id: &str) -> Result<FileMeta, ProviderError> {
        self.inner.file_meta_boxed(file_id).await
    }

    pub async fn file_content(&self, file_id: &str) -> Result<Vec<u8>, ProviderError> {
        self.inner.file_content_boxed(file_id).await
    }

    pub async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, ProviderError> {
        self.inner.generate_image_boxed(prompt).await
    }

    pub async fn edit_image(&self, image: &[u8], prompt: &str) -> Result<GeneratedImage, ProviderError> {
        self.inner.edit_image_boxed(image, prompt).await
    }
}
