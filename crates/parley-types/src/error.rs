use thiserror::Error;

/// Errors reported by a provider adapter (assistant or video endpoint).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("conversation context expired: {0}")]
    ContextExpired(String),

    #[error("unsupported input: {0}")]
    UnsupportedInput(String),
}

impl ProviderError {
    /// A 502 from the primary is read as "primary is down", whatever the
    /// adapter managed to parse out of the response.
    pub fn is_bad_gateway(&self) -> bool {
        match self {
            ProviderError::Http { status: 502, .. } => true,
            other => other.to_string().contains("502"),
        }
    }

    /// Network failures, rate limits and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Network(_) | ProviderError::RateLimited { .. } => true,
            ProviderError::Http { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }

    /// Network failures and any 4xx/5xx answer, however the adapter
    /// classified it. Render-status polls tolerate all of these.
    pub fn is_error_status(&self) -> bool {
        match self {
            ProviderError::Network(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::AuthenticationFailed
            | ProviderError::NotFound(_) => true,
            ProviderError::Http { status, .. } => (400..600).contains(status),
            _ => false,
        }
    }

    /// Whether another attempt could possibly succeed.
    ///
    /// Expired contexts and rejected input are handed straight back to the
    /// orchestrator; auth failures and missing resources won't heal on retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ProviderError::ContextExpired(_)
                | ProviderError::UnsupportedInput(_)
                | ProviderError::AuthenticationFailed
                | ProviderError::NotFound(_)
        )
    }
}

/// Errors raised by the orchestration layer.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    #[error("conversation context '{context_id}' is busy with another request")]
    LockContention { context_id: String },

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    #[error("job failed: {code} - {message}")]
    JobFailed { code: String, message: String },

    #[error("job timed out after {attempts} polls")]
    JobTimeout { attempts: u32 },

    #[error("job requires action: {0}")]
    RequiresAction(String),

    #[error("polling cancelled")]
    Cancelled,

    #[error("conversation context expired")]
    ContextExpired,

    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("assistant unavailable: {0}")]
    AssistantUnavailable(String),

    #[error("context store error: {0}")]
    Store(#[from] RepositoryError),

    #[error(transparent)]
    Provider(ProviderError),
}

impl From<ProviderError> for BrokerError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::ContextExpired(_) => BrokerError::ContextExpired,
            ProviderError::UnsupportedInput(msg) => BrokerError::UnsupportedInput(msg),
            ProviderError::Network(msg) => BrokerError::TransientNetwork(msg),
            ProviderError::Http { status: 502, message } => {
                BrokerError::ProviderUnavailable(format!("HTTP 502: {message}"))
            }
            other => BrokerError::Provider(other),
        }
    }
}

/// Errors from the conversation context store.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,
}
