//! Durable owner -> conversation context mapping.

use dashmap::DashMap;

use parley_types::conversation::ConversationContext;
use parley_types::error::RepositoryError;

/// Repository trait for owner -> context id persistence.
///
/// Implementations live in parley-infra (e.g., `SqliteContextStore`).
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait ConversationContextStore: Send + Sync {
    /// Context id stored for `owner_id`, if any.
    fn get_context_id(
        &self,
        owner_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<String>, RepositoryError>> + Send;

    /// Store `context_id` for `owner_id`. `None` clears the mapping.
    fn set_context_id(
        &self,
        owner_id: i64,
        context_id: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Every stored mapping. Used to warm the in-process cache at startup.
    fn list_contexts(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationContext>, RepositoryError>> + Send;
}

/// Process-local store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct InMemoryContextStore {
    contexts: DashMap<i64, String>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationContextStore for InMemoryContextStore {
    async fn get_context_id(&self, owner_id: i64) -> Result<Option<String>, RepositoryError> {
        Ok(self.contexts.get(&owner_id).map(|id| id.value().clone()))
    }

    async fn set_context_id(
        &self,
        owner_id: i64,
        context_id: Option<&str>,
    ) -> Result<(), RepositoryError> {
        match context_id {
            Some(id) => {
                self.contexts.insert(owner_id, id.to_string());
            }
            None => {
                self.contexts.remove(&owner_id);
            }
        }
        Ok(())
    }

    async fn list_contexts(&self) -> Result<Vec<ConversationContext>, RepositoryError> {
        let mut contexts: Vec<_> = self
            .contexts
            .iter()
            .map(|item| ConversationContext {
                id: item.value().clone(),
                owner_id: *item.key(),
            })
            .collect();
        contexts.sort_by_key(|c| c.owner_id);
        Ok(contexts)
    }
}
