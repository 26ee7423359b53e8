//! Configuration and secret loading for Parley.
//!
//! Reads `parley.toml` (default `~/.parley/parley.toml`) into [`BrokerConfig`]
//! and falls back to defaults when the file is missing or malformed. API keys
//! never live in the file: they come from the environment and are wrapped in
//! [`SecretString`] as soon as they are read.

use std::path::{Path, PathBuf};

use anyhow::Context;
use secrecy::{ExposeSecret, SecretString};

use parley_types::config::BrokerConfig;

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const KLING_ACCESS_KEY: &str = "KLING_ACCESS_KEY";
pub const KLING_SECRET_KEY: &str = "KLING_SECRET_KEY";
pub const KLING_API_URL: &str = "KLING_API_URL";

/// `~/.parley/parley.toml`, or `./.parley/parley.toml` when there is no home directory.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".parley")
        .join("parley.toml")
}

/// Load configuration from `path`.
///
/// - Missing file: [`BrokerConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
pub async fn load_config(path: &Path) -> BrokerConfig {
    match tokio::fs::try_exists(path).await {
        Ok(false) => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return BrokerConfig::default();
        }
        Ok(true) => {}
        Err(err) => {
            tracing::warn!("Failed to stat {}: {err}, using defaults", path.display());
            return BrokerConfig::default();
        }
    }

    match read_config(path).await {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("{err:#}, using defaults");
            BrokerConfig::default()
        }
    }
}

/// Strict variant of [`load_config`]: every failure is an error.
pub async fn read_config(path: &Path) -> anyhow::Result<BrokerConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Credentials and endpoint overrides read from the environment.
///
/// Does NOT derive Debug: the keys must never reach a log line.
#[derive(Clone, Default)]
pub struct Secrets {
    pub openai_api_key: Option<SecretString>,
    pub openai_base_url: Option<String>,
    pub kling_access_key: Option<SecretString>,
    pub kling_secret_key: Option<SecretString>,
    pub kling_api_url: Option<String>,
}

impl Secrets {
    /// Read every variable from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read every variable through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let secret = |key: &str| {
            value(key).map(|v| {
                // Keys pasted from dashboards sometimes carry stray whitespace or line breaks.
                let compact: String = v.chars().filter(|c| !c.is_whitespace()).collect();
                SecretString::from(compact)
            })
        };

        Self {
            openai_api_key: secret(OPENAI_API_KEY),
            openai_base_url: value(OPENAI_BASE_URL),
            kling_access_key: secret(KLING_ACCESS_KEY),
            kling_secret_key: secret(KLING_SECRET_KEY),
            kling_api_url: value(KLING_API_URL),
        }
    }

    /// Both Kling keys are present.
    pub fn has_video_credentials(&self) -> bool {
        self.kling_access_key.is_some() && self.kling_secret_key.is_some()
    }

    /// Apply endpoint overrides from the environment on top of the file config.
    pub fn apply_overrides(&self, config: &mut BrokerConfig) {
        if let Some(url) = &self.openai_base_url {
            config.provider.primary_base_url = url.clone();
        }
        if let Some(url) = &self.kling_api_url {
            config.video.api_url = url.clone();
        }
    }

    /// The OpenAI key, or an empty string when unset (requests then fail with 401).
    pub(crate) fn openai_key_or_empty(&self) -> SecretString {
        self.openai_api_key
            .clone()
            .unwrap_or_else(|| SecretString::from(String::new()))
    }
}

/// Whether a secret holds anything. Used by status output without exposing the value.
pub fn is_set(secret: &Option<SecretString>) -> bool {
    secret
        .as_ref()
        .is_some_and(|s| !s.expose_secret().is_empty())
}
