//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST API.
//! Core services are generic over provider/store traits; AppState pins them to
//! the infra implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parley_core::orchestrator::{ConversationOrchestrator, OrchestratorConfig};
use parley_core::poller::{AsyncJobPoller, PollConfig};
use parley_core::provider::{BoxAssistantProvider, ProviderHealthMonitor};
use parley_core::retry::{RetryExecutor, RetryPolicy};
use parley_core::video::VideoService;
use parley_infra::config::{Secrets, default_config_path, load_config};
use parley_infra::kling::KlingVideoProvider;
use parley_infra::openai::OpenAiAssistantProvider;
use parley_infra::sqlite::context::SqliteContextStore;
use parley_infra::sqlite::pool::{
    DatabasePool, database_url_for, default_data_dir, default_database_url,
};
use parley_types::config::BrokerConfig;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteOrchestrator = ConversationOrchestrator<SqliteContextStore>;

pub type ConcreteVideoService = VideoService<KlingVideoProvider, ConcreteOrchestrator>;

/// Shared application state holding all services.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConcreteOrchestrator>,
    pub video_service: Arc<ConcreteVideoService>,
    pub config: Arc<BrokerConfig>,
    pub config_path: PathBuf,
}

impl AppState {
    /// Load config and secrets, open the database, wire providers and services,
    /// then warm the context cache from the store.
    pub async fn init(config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let config_path = config_path.unwrap_or_else(default_config_path);
        let mut config = load_config(&config_path).await;

        let secrets = Secrets::from_env();
        secrets.apply_overrides(&mut config);
        if secrets.openai_api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY is not set; assistant requests will be rejected");
        }
        if config.provider.assistant_id.is_empty() {
            tracing::warn!(path = %config_path.display(), "provider.assistant_id is not configured");
        }

        let db_pool = DatabasePool::new(&resolve_database_url(&config).await?).await?;

        let primary = OpenAiAssistantProvider::primary(&config.provider, &secrets)?;
        let fallback = OpenAiAssistantProvider::fallback(&config.provider, &secrets)?;
        let monitor = Arc::new(ProviderHealthMonitor::new(
            BoxAssistantProvider::new(primary),
            BoxAssistantProvider::new(fallback),
            Duration::from_secs(config.provider.health_check_interval_secs),
        ));
        let executor = RetryExecutor::new(monitor, RetryPolicy::from(&config.retry));

        let orchestrator = Arc::new(ConversationOrchestrator::new(
            SqliteContextStore::new(db_pool),
            executor,
            OrchestratorConfig::from_broker_config(&config),
        ));

        let video_poller = AsyncJobPoller::new(PollConfig::from_millis(
            config.polling.video_interval_ms,
            config.polling.video_max_attempts,
        ));
        let video_service = VideoService::new(
            KlingVideoProvider::from_secrets(config.video.clone(), &secrets)?,
            orchestrator.clone(),
            video_poller,
            RetryPolicy::from(&config.retry),
        )
        .with_prompt_optimization(config.video.optimize_prompts)
        .with_cancellation(orchestrator.cancellation_token());

        let restored = orchestrator.restore_contexts().await?;
        tracing::debug!(restored, "application state initialized");

        Ok(Self {
            orchestrator,
            video_service: Arc::new(video_service),
            config: Arc::new(config),
            config_path,
        })
    }
}

/// `storage.database_path` when set, else `parley.db` in the data directory
/// (created on demand).
async fn resolve_database_url(config: &BrokerConfig) -> anyhow::Result<String> {
    match config.storage.database_path.as_deref() {
        Some(path) => {
            ensure_parent_dir(Path::new(path)).await?;
            Ok(database_url_for(path))
        }
        None => {
            tokio::fs::create_dir_all(default_data_dir()).await?;
            Ok(default_database_url())
        }
    }
}

async fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}
