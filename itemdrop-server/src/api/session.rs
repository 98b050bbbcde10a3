//! Session tokens.
//!
//! Streamers get an HS256 session JWT after sign-in. Viewers arrive with a
//! JWT signed by the Twitch extension, verified with the base64 extension
//! secret.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Claims of a streamer session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Twitch profile id of the streamer.
    pub sub: String,
    pub display_name: String,
    pub exp: i64,
    pub iat: i64,
}

/// A freshly issued session token.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    /// Unix timestamp the token stops being valid at.
    pub expires_at: i64,
}

/// Creates and verifies streamer session tokens.
#[derive(Clone)]
pub struct SessionTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SessionTokens {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(
        &self,
        profile_id: &str,
        display_name: &str,
        ttl: Duration,
    ) -> Result<IssuedSession, jsonwebtoken::errors::Error> {
        let now = OffsetDateTime::now_utc();
        let expires_at = (now + ttl).unix_timestamp();
        let claims = SessionClaims {
            sub: profile_id.to_string(),
            display_name: display_name.to_string(),
            exp: expires_at,
            iat: now.unix_timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok(IssuedSession { token, expires_at })
    }

    /// Returns the claims if the token is valid and not expired.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, jsonwebtoken::errors::Error> {
        decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
    }
}

/// Claims the Twitch extension puts in a viewer token.
///
/// `user_id` is only present once the viewer has shared their identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionClaims {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub opaque_user_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: i64,
}

pub fn verify_extension_token(
    secret_base64: &str,
    token: &str,
) -> Result<ExtensionClaims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_base64_secret(secret_base64)?;
    decode::<ExtensionClaims>(token, &key, &Validation::new(Algorithm::HS256))
        .map(|data| data.claims)
}
