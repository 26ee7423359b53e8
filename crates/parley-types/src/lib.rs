//! Shared domain types for Parley.
//!
//! Conversations, jobs, provider payloads, video requests, configuration and
//! the error taxonomy used across the broker.
//!
//! Zero infrastructure dependencies -- only serde and thiserror.

pub mod config;
pub mod conversation;
pub mod error;
pub mod job;
pub mod provider;
pub mod video;
