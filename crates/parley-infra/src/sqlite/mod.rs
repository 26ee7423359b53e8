//! SQLite persistence for the owner -> context mapping.

pub mod context;
pub mod pool;
