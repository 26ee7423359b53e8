//! Broker configuration types.
//!
//! `BrokerConfig` is the top-level `parley.toml`. Every section and field has
//! a default, so an empty file (or no file at all) is a valid configuration.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub video: VideoSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

/// Assistant provider endpoints and behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Preferred endpoint. `OPENAI_BASE_URL` overrides it.
    #[serde(default = "default_openai_base_url")]
    pub primary_base_url: String,
    /// Endpoint used while the primary is unavailable.
    #[serde(default = "default_openai_base_url")]
    pub fallback_base_url: String,
    /// Assistant that answers conversations.
    #[serde(default)]
    pub assistant_id: String,
    /// Assistant that rewrites video prompts. Optimisation is skipped when unset.
    #[serde(default)]
    pub prompt_optimizer_assistant_id: Option<String>,
    /// Assistant that converts uploaded files to JSON.
    #[serde(default)]
    pub file_to_json_assistant_id: Option<String>,
    /// Check the assistant exists before every conversation turn.
    #[serde(default = "default_verify_assistant")]
    pub verify_assistant: bool,
    /// Minimum seconds between primary health probes.
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Model used for image generation.
    #[serde(default = "default_image_model")]
    pub image_model: String,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_verify_assistant() -> bool {
    true
}

fn default_health_check_interval_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_image_model() -> String {
    "gpt-image-1".to_string()
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            primary_base_url: default_openai_base_url(),
            fallback_base_url: default_openai_base_url(),
            assistant_id: String::new(),
            prompt_optimizer_assistant_id: None,
            file_to_json_assistant_id: None,
            verify_assistant: default_verify_assistant(),
            health_check_interval_secs: default_health_check_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            image_model: default_image_model(),
        }
    }
}

/// Retry policy for provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

/// Poll cadence for runs and video jobs. Timeout = interval x max attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingSettings {
    #[serde(default = "default_run_interval_ms")]
    pub run_interval_ms: u64,
    #[serde(default = "default_run_max_attempts")]
    pub run_max_attempts: u32,
    #[serde(default = "default_video_interval_ms")]
    pub video_interval_ms: u64,
    #[serde(default = "default_video_max_attempts")]
    pub video_max_attempts: u32,
}

fn default_run_interval_ms() -> u64 {
    1000
}

fn default_run_max_attempts() -> u32 {
    300
}

fn default_video_interval_ms() -> u64 {
    10_000
}

fn default_video_max_attempts() -> u32 {
    30
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            run_interval_ms: default_run_interval_ms(),
            run_max_attempts: default_run_max_attempts(),
            video_interval_ms: default_video_interval_ms(),
            video_max_attempts: default_video_max_attempts(),
        }
    }
}

/// Video provider request defaults. Credentials come from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSettings {
    /// `KLING_API_URL` overrides it.
    #[serde(default = "default_video_api_url")]
    pub api_url: String,
    #[serde(default = "default_video_model")]
    pub model_name: String,
    #[serde(default = "default_video_duration")]
    pub duration: String,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_video_mode")]
    pub mode: String,
    #[serde(default = "default_cfg_scale")]
    pub cfg_scale: f64,
    /// Lifetime of each signed request token.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_optimize_prompts")]
    pub optimize_prompts: bool,
}

fn default_video_api_url() -> String {
    "https://api.klingai.com".to_string()
}

fn default_video_model() -> String {
    "kling-v1-6".to_string()
}

fn default_video_duration() -> String {
    "5".to_string()
}

fn default_aspect_ratio() -> String {
    "1:1".to_string()
}

fn default_video_mode() -> String {
    "std".to_string()
}

fn default_cfg_scale() -> f64 {
    0.5
}

fn default_token_ttl_secs() -> u64 {
    1800
}

fn default_optimize_prompts() -> bool {
    true
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            api_url: default_video_api_url(),
            model_name: default_video_model(),
            duration: default_video_duration(),
            aspect_ratio: default_aspect_ratio(),
            mode: default_video_mode(),
            cfg_scale: default_cfg_scale(),
            token_ttl_secs: default_token_ttl_secs(),
            optimize_prompts: default_optimize_prompts(),
        }
    }
}

/// Where owner -> context mappings are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file. Defaults to `parley.db` in the data directory.
    #[serde(default)]
    pub database_path: Option<String>,
}
