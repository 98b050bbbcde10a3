//! The OAuth provider seam used by the token lifecycle manager.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// A successful authorization-code or refresh grant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present when the provider issues or rotates the refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    pub expires_in: u64,
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("refresh token rejected: {0}")]
    InvalidRefreshToken(String),

    #[error("client credentials rejected: {0}")]
    InvalidClient(String),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// The `message` field of a Twitch error body, or the raw body.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.to_string())
}

impl ProviderError {
    /// Classify a failed token endpoint response.
    ///
    /// Only responses that name the refresh token or the client are treated
    /// as fatal. Anything else stays retryable so an ambiguous failure never
    /// purges a stored credential.
    pub fn from_token_response(status: u16, body: &str, retry_after: Duration) -> Self {
        if status == 429 {
            return ProviderError::RateLimited { retry_after };
        }

        let message = error_message(body);
        let lowered = message.to_ascii_lowercase();

        match status {
            400 | 401
                if lowered.contains("refresh token") || lowered.contains("invalid token") =>
            {
                ProviderError::InvalidRefreshToken(message)
            }
            400 | 401 | 403 if lowered.contains("client") => ProviderError::InvalidClient(message),
            _ => ProviderError::Upstream { status, message },
        }
    }

    /// Twitch answers a second reward with the same title this way.
    pub fn is_duplicate_reward(&self) -> bool {
        matches!(self, ProviderError::Upstream { message, .. } if message.contains("DUPLICATE_REWARD"))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

/// Token endpoint operations for the bot identity.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Exchange a one-time authorization code.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError>;

    /// Login name of the identity behind `access_token`.
    async fn fetch_login(&self, access_token: &str) -> Result<String, ProviderError>;
}
