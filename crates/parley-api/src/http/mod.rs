//! HTTP/REST API layer for Parley.
//!
//! Axum-based diagnostics API at `/api/v1/` with envelope responses and CORS.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
