//! Request orchestration and concurrency control for Parley.
//!
//! This crate defines the provider and store "ports" that the infrastructure
//! layer implements, plus everything that sits between a caller and those
//! ports: the per-conversation lock, primary/fallback selection, retry,
//! job polling and answer assembly. It depends only on `parley-types` --
//! never on `parley-infra` or any HTTP/database crate.

pub mod assembler;
pub mod lock;
pub mod orchestrator;
pub mod poller;
pub mod provider;
pub mod retry;
pub mod store;
pub mod video;

#[cfg(test)]
pub(crate) mod testing;
