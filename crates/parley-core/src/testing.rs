//! Hand-written mock provider shared by the unit tests in this crate.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use parley_types::error::ProviderError;
use parley_types::job::{JobSnapshot, JobStatus};
use parley_types::provider::{
    AssistantInfo, AssistantMessage, ContentPart, FileMeta, FilePurpose, GeneratedImage, RunInfo, UserMessage,
};

use crate::provider::AssistantProvider;

#[derive(Default)]
struct MockState {
    probe_failing: AtomicBool,
    probe_calls: AtomicU32,
    next_id: AtomicU32,
    calls: Mutex<Vec<String>>,
    contexts: Mutex<HashSet<String>>,
    messages: Mutex<Vec<(String, UserMessage)>>,
    uploads: Mutex<Vec<(String, FilePurpose)>>,
    file_search: Mutex<Vec<(String, Vec<String>)>>,
    runs: Mutex<Vec<RunInfo>>,
    run_script: Mutex<VecDeque<Result<JobSnapshot, ProviderError>>>,
    append_errors: Mutex<VecDeque<ProviderError>>,
    create_run_errors: Mutex<VecDeque<ProviderError>>,
    reply: Mutex<Option<AssistantMessage>>,
    files: Mutex<HashMap<String, (Option<String>, Vec<u8>)>>,
    image: Mutex<Option<Result<GeneratedImage, ProviderError>>>,
    assistant_error: Mutex<Option<ProviderError>>,
    edits: Mutex<Vec<(Vec<u8>, String)>>,
}

/// Scriptable in-memory assistant provider. Clones share state.
#[derive(Clone, Default)]
pub struct MockAssistantProvider {
    name: String,
    base_url: String,
    state: Arc<MockState>,
}

impl MockAssistantProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: "https://mock.invalid/v1".to_string(),
            state: Arc::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    fn record(&self, call: impl Into<String>) {
        self.state.calls.lock().unwrap().push(call.into());
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let n = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}_{n}")
    }

    pub fn set_probe_ok(&self, ok: bool) {
        self.state.probe_failing.store(!ok, Ordering::SeqCst);
    }

    pub fn probe_calls(&self) -> u32 {
        self.state.probe_calls.load(Ordering::SeqCst)
    }

    /// Operation names in call order (probes excluded).
    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn add_context(&self, context_id: &str) {
        self.state.contexts.lock().unwrap().insert(context_id.to_string());
    }

    pub fn forget_context(&self, context_id: &str) {
        self.state.contexts.lock().unwrap().remove(context_id);
    }

    pub fn messages(&self) -> Vec<(String, UserMessage)> {
        self.state.messages.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<(String, FilePurpose)> {
        self.state.uploads.lock().unwrap().clone()
    }

    pub fn file_search(&self) -> Vec<(String, Vec<String>)> {
        self.state.file_search.lock().unwrap().clone()
    }

    pub fn set_runs(&self, runs: Vec<RunInfo>) {
        *self.state.runs.lock().unwrap() = runs;
    }

    /// Snapshots returned by successive `fetch_run` calls. Once exhausted,
    /// runs report `Succeeded`.
    pub fn push_run_status(&self, result: Result<JobSnapshot, ProviderError>) {
        self.state.run_script.lock().unwrap().push_back(result);
    }

    pub fn push_append_error(&self, err: ProviderError) {
        self.state.append_errors.lock().unwrap().push_back(err);
    }

    pub fn push_create_run_error(&self, err: ProviderError) {
        self.state.create_run_errors.lock().unwrap().push_back(err);
    }

    pub fn set_reply(&self, message: AssistantMessage) {
        *self.state.reply.lock().unwrap() = Some(message);
    }

    pub fn set_reply_text(&self, text: &str) {
        self.set_reply(AssistantMessage {
            id: "msg_reply".to_string(),
            content: vec![ContentPart::Text {
                value: text.to_string(),
                annotations: vec![],
            }],
            attachment_file_ids: vec![],
        });
    }

    pub fn add_file(&self, file_id: &str, filename: Option<&str>, bytes: &[u8]) {
        self.state.files.lock().unwrap().insert(
            file_id.to_string(),
            (filename.map(str::to_string), bytes.to_vec()),
        );
    }

    /// Make every `retrieve_assistant` call fail with `err` (`None` restores).
    pub fn set_assistant_error(&self, err: Option<ProviderError>) {
        *self.state.assistant_error.lock().unwrap() = err;
    }

    pub fn edits(&self) -> Vec<(Vec<u8>, String)> {
        self.state.edits.lock().unwrap().clone()
    }

    pub fn set_image(&self, result: Result<GeneratedImage, ProviderError>) {
        *self.state.image.lock().unwrap() = Some(result);
    }
}

impl AssistantProvider for MockAssistantProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        self.state.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.probe_failing.load(Ordering::SeqCst) {
            Err(ProviderError::Network("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantInfo, ProviderError> {
        self.record("retrieve_assistant");
        if let Some(err) = self.state.assistant_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(AssistantInfo {
            id: assistant_id.to_string(),
            name: Some("Mock assistant".to_string()),
            ..Default::default()
        })
    }

    async fn create_context(&self) -> Result<String, ProviderError> {
        self.record("create_context");
        // Real adapters suspend on the HTTP round trip here.
        tokio::task::yield_now().await;
        let id = self.fresh_id("thread");
        self.add_context(&id);
        Ok(id)
    }

    async fn context_exists(&self, context_id: &str) -> Result<bool, ProviderError> {
        self.record("context_exists");
        Ok(self.state.contexts.lock().unwrap().contains(context_id))
    }

    async fn append_message(
        &self,
        context_id: &str,
        message: &UserMessage,
    ) -> Result<(), ProviderError> {
        self.record("append_message");
        if let Some(err) = self.state.append_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.state
            .messages
            .lock()
            .unwrap()
            .push((context_id.to_string(), message.clone()));
        Ok(())
    }

    async fn upload_file(
        &self,
        filename: &str,
        _bytes: &[u8],
        purpose: FilePurpose,
    ) -> Result<String, ProviderError> {
        self.record("upload_file");
        self.state
            .uploads
            .lock()
            .unwrap()
            .push((filename.to_string(), purpose));
        Ok(self.fresh_id("file"))
    }

    async fn attach_file_search(
        &self,
        context_id: &str,
        file_ids: &[String],
    ) -> Result<(), ProviderError> {
        self.record("attach_file_search");
        self.state
            .file_search
            .lock()
            .unwrap()
            .push((context_id.to_string(), file_ids.to_vec()));
        Ok(())
    }

    async fn create_run(
        &self,
        _context_id: &str,
        _assistant_id: &str,
    ) -> Result<RunInfo, ProviderError> {
        self.record("create_run");
        if let Some(err) = self.state.create_run_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(RunInfo {
            id: self.fresh_id("run"),
            snapshot: JobSnapshot::new(JobStatus::Submitted),
        })
    }

    async fn fetch_run(&self, _context_id: &str, run_id: &str) -> Result<JobSnapshot, ProviderError> {
        self.record("fetch_run");
        self.state
            .run_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(JobSnapshot::new(JobStatus::Succeeded).with_artifact(run_id)))
    }

    async fn list_runs(&self, _context_id: &str) -> Result<Vec<RunInfo>, ProviderError> {
        self.record("list_runs");
        Ok(self.state.runs.lock().unwrap().clone())
    }

    async fn latest_assistant_message(
        &self,
        _context_id: &str,
    ) -> Result<Option<AssistantMessage>, ProviderError> {
        self.record("latest_assistant_message");
        Ok(self.state.reply.lock().unwrap().clone())
    }

    async fn file_meta(&self, file_id: &str) -> Result<FileMeta, ProviderError> {
        let files = self.state.files.lock().unwrap();
        let (filename, bytes) = files
            .get(file_id)
            .ok_or_else(|| ProviderError::NotFound(file_id.to_string()))?;
        Ok(FileMeta {
            id: file_id.to_string(),
            filename: filename.clone(),
            bytes: Some(bytes.len() as u64),
        })
    }

    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>, ProviderError> {
        self.state
            .files
            .lock()
            .unwrap()
            .get(file_id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| ProviderError::NotFound(file_id.to_string()))
    }

    async fn generate_image(&self, _prompt: &str) -> Result<GeneratedImage, ProviderError> {
        self.record("generate_image");
        self.state
            .image
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(GeneratedImage::Url("https://mock.invalid/image.png".to_string())))
    }

    async fn edit_image(&self, image: &[u8], prompt: &str) -> Result<GeneratedImage, ProviderError> {
        self.record("edit_image");
        self.state
            .edits
            .lock()
            .unwrap()
            .push((image.to_vec(), prompt.to_string()));
        self.state
            .image
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(GeneratedImage::Url("https://mock.invalid/edited.png".to_string())))
    }
}
