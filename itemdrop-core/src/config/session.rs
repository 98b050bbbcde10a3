//! Streamer session configuration.

use time::Duration;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HMAC secret for streamer session JWTs.
    pub jwt_secret: String,
    /// Where the sign-in flow redirects once a session is issued.
    pub app_callback_url: String,
    pub ttl: Duration,
}
