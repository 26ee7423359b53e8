//! HS256 JSON Web Tokens for the Kling API.
//!
//! Kling authenticates every request with a short-lived JWT signed by the
//! account's secret key, with the access key as issuer. The token is three
//! base64url segments (header, claims, HMAC-SHA256 signature), so it is
//! assembled here directly rather than through a JWT library.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Clock skew allowance: tokens are valid from a few seconds in the past.
pub const NOT_BEFORE_SKEW_SECS: i64 = 5;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("failed to encode claims: {0}")]
    Encoding(String),
}

/// Registered claims Kling checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub exp: i64,
    pub nbf: i64,
}

impl Claims {
    /// Claims for a token issued at `now` (unix seconds) that lives `ttl_secs`.
    pub fn issued_at(access_key: &str, now: i64, ttl_secs: i64) -> Self {
        Self {
            iss: access_key.to_string(),
            exp: now + ttl_secs,
            nbf: now - NOT_BEFORE_SKEW_SECS,
        }
    }
}

/// Sign `claims` with `secret_key`.
pub fn encode(claims: &Claims, secret_key: &[u8]) -> Result<String, TokenError> {
    let payload = serde_json::to_vec(claims).map_err(|e| TokenError::Encoding(e.to_string()))?;
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(HEADER),
        URL_SAFE_NO_PAD.encode(payload)
    );

    let mut mac =
        HmacSha256::new_from_slice(secret_key).map_err(|e| TokenError::InvalidKey(e.to_string()))?;
    mac.update(signing_input.as_bytes());
    let signature = mac.finalize().into_bytes();

    Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
}
