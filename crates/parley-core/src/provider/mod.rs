//! Assistant provider abstractions.
//!
//! - `AssistantProvider`: RPITIT trait for concrete provider implementations
//! - `BoxAssistantProvider`: object-safe wrapper for dynamic dispatch
//! - `ProviderHealthMonitor`: primary/fallback selection with cached health

pub mod box_provider;
pub mod health;
#[allow(clippy::module_inception)]
pub mod provider;

pub use box_provider::BoxAssistantProvider;
pub use health::{ProviderHealthMonitor, ProviderSelection};
pub use provider::AssistantProvider;
