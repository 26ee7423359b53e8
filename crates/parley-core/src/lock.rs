//! Per-conversation mutual exclusion.
//!
//! A context id is either free or held by exactly one in-flight operation.
//! A second acquisition fails immediately with `LockContention`; callers are
//! never queued. The returned [`LockGuard`] releases on drop, so every exit
//! path (including `?` and unwinding) frees the context.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use parley_types::error::BrokerError;

/// Who holds a context and since when.
#[derive(Debug, Clone)]
pub struct LockEntry {
    pub owner_id: i64,
    pub acquired_at: DateTime<Utc>,
    token: u64,
}

/// Table of contexts with an operation in flight.
#[derive(Debug, Clone, Default)]
pub struct ConversationLock {
    active: Arc<DashMap<String, LockEntry>>,
    next_token: Arc<AtomicU64>,
}

impl ConversationLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `context_id` for `owner_id`, or fail if it is already held.
    pub fn acquire(&self, context_id: &str, owner_id: i64) -> Result<LockGuard, BrokerError> {
        match self.active.entry(context_id.to_string()) {
            Entry::Occupied(_) => {
                debug!(context_id, owner_id, "conversation context busy");
                Err(BrokerError::LockContention {
                    context_id: context_id.to_string(),
                })
            }
            Entry::Vacant(slot) => {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                slot.insert(LockEntry {
                    owner_id,
                    acquired_at: Utc::now(),
                    token,
                });
                debug!(context_id, owner_id, "conversation context locked");
                Ok(LockGuard {
                    active: Arc::clone(&self.active),
                    context_id: context_id.to_string(),
                    token,
                })
            }
        }
    }

    /// Drop the entry for `context_id`. Idempotent.
    pub fn release(&self, context_id: &str) {
        if self.active.remove(context_id).is_some() {
            debug!(context_id, "conversation context released");
        }
    }

    pub fn is_locked(&self, context_id: &str) -> bool {
        self.active.contains_key(context_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn active_contexts(&self) -> Vec<(String, LockEntry)> {
        self.active
            .iter()
            .map(|item| (item.key().clone(), item.value().clone()))
            .collect()
    }
}

/// Holds a context until dropped.
#[derive(Debug)]
pub struct LockGuard {
    active: Arc<DashMap<String, LockEntry>>,
    context_id: String,
    token: u64,
}

impl LockGuard {
    pub fn context_id(&self) -> &str {
        &self.context_id
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Only remove our own entry; an explicit release may have let
        // another operation claim the id since.
        let token = self.token;
        self.active
            .remove_if(&self.context_id, |_, entry| entry.token == token);
    }
}
