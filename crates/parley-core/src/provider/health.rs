//! Primary/fallback provider selection with a throttled health check.
//!
//! The primary is probed at most once per `check_interval`. Between probes the
//! cached verdict is used without any network call. A 502 seen by the retry
//! executor flips the verdict to "unavailable" until the next probe.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use parley_types::provider::{ProviderRole, ProviderStatus};

use super::box_provider::BoxAssistantProvider;

/// Default minimum time between primary probes.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct HealthState {
    is_primary_available: bool,
    last_checked_at: Option<Instant>,
}

/// The provider chosen for one call.
#[derive(Clone)]
pub struct ProviderSelection {
    pub role: ProviderRole,
    pub provider: Arc<BoxAssistantProvider>,
}

/// Tracks whether the primary provider is reachable.
pub struct ProviderHealthMonitor {
    primary: Arc<BoxAssistantProvider>,
    fallback: Arc<BoxAssistantProvider>,
    check_interval: Duration,
    state: Mutex<HealthState>,
}

impl ProviderHealthMonitor {
    pub fn new(
        primary: BoxAssistantProvider,
        fallback: BoxAssistantProvider,
        check_interval: Duration,
    ) -> Self {
        Self {
            primary: Arc::new(primary),
            fallback: Arc::new(fallback),
            check_interval,
            state: Mutex::new(HealthState {
                is_primary_available: true,
                last_checked_at: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, HealthState> {
        // Never held across an await; a poisoned lock still holds a usable bool.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pick the provider for the next call, probing the primary if the cached
    /// verdict is older than `check_interval`.
    pub async fn preferred(&self) -> ProviderSelection {
        let due = {
            let state = self.state();
            state
                .last_checked_at
                .is_none_or(|at| at.elapsed() >= self.check_interval)
        };

        let available = if due {
            self.check_primary().await
        } else {
            self.state().is_primary_available
        };

        if available {
            ProviderSelection {
                role: ProviderRole::Primary,
                provider: Arc::clone(&self.primary),
            }
        } else {
            ProviderSelection {
                role: ProviderRole::Fallback,
                provider: Arc::clone(&self.fallback),
            }
        }
    }

    /// Probe the primary now and record the verdict.
    async fn check_primary(&self) -> bool {
        // Stamp before probing so concurrent callers don't all probe.
        self.state().last_checked_at = Some(Instant::now());

        let available = match self.primary.probe().await {
            Ok(()) => {
                debug!(provider = %self.primary.name(), "primary provider reachable");
                true
            }
            Err(err) => {
                warn!(
                    provider = %self.primary.name(),
                    error = %err,
                    "primary provider unreachable, using fallback"
                );
                false
            }
        };

        self.state().is_primary_available = available;
        available
    }

    /// Record that the primary returned a 502. Takes effect immediately.
    pub fn mark_primary_unavailable(&self) {
        let mut state = self.state();
        if state.is_primary_available {
            warn!(provider = %self.primary.name(), "primary provider marked unavailable");
        }
        state.is_primary_available = false;
    }

    /// Discard the cached verdict and probe the primary immediately.
    pub async fn force_recheck(&self) -> bool {
        self.state().last_checked_at = None;
        let available = self.check_primary().await;
        info!(available, "forced primary health recheck");
        available
    }

    pub fn is_primary_available(&self) -> bool {
        self.state().is_primary_available
    }

    pub fn status(&self) -> ProviderStatus {
        ProviderStatus {
            primary_endpoint: self.primary.base_url().to_string(),
            fallback_endpoint: self.fallback.base_url().to_string(),
            is_primary_available: self.is_primary_available(),
        }
    }

    pub fn primary(&self) -> &Arc<BoxAssistantProvider> {
        &self.primary
    }

    pub fn fallback(&self) -> &Arc<BoxAssistantProvider> {
        &self.fallback
    }
}
