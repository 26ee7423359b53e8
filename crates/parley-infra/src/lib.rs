//! Infrastructure layer for Parley.
//!
//! Contains implementations of the traits defined in `parley-core`:
//! the OpenAI Assistants provider, the Kling video provider and the SQLite
//! conversation context store, plus configuration and secret loading.

pub mod config;
pub mod kling;
pub mod openai;
pub mod sqlite;
