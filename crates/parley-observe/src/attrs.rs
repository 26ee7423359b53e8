//! Span names shared by the binary's entry points.
//!
//! Provider adapters and the orchestrator record `owner_id`, `context_id`,
//! `job_id`, `attempt` and `provider` as fields; these names group those
//! events under one root span per user-facing operation.

/// One `chat` invocation.
pub const SPAN_CONVERSE: &str = "parley.converse";

/// One `video` invocation.
pub const SPAN_GENERATE_VIDEO: &str = "parley.generate_video";

/// One HTTP request served by `serve`.
pub const SPAN_HTTP_REQUEST: &str = "parley.http.request";
