//! Twitch OAuth and Helix client.

use crate::auth::{OAuthProvider, ProviderError, TokenGrant, error_message};
use crate::config::TwitchConfig;
use async_trait::async_trait;
use itemdrop_sdk::objects::eventsub::CHANNEL_POINTS_REDEMPTION_ADD;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Wait used when a rate-limited response carries no usable hint.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TwitchUser {
    pub id: String,
    pub login: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CustomReward {
    pub id: String,
    pub title: String,
}

#[derive(Deserialize)]
struct HelixData<T> {
    data: Vec<T>,
}

#[derive(Serialize)]
struct CreateRewardBody<'a> {
    title: &'a str,
    cost: u32,
    prompt: &'a str,
    is_enabled: bool,
    background_color: &'a str,
    is_user_input_required: bool,
    should_redemptions_skip_request_queue: bool,
}

#[derive(Deserialize)]
struct AppToken {
    access_token: String,
}

/// How long to wait before retrying a rate-limited request.
///
/// Prefers `Retry-After` seconds, then Twitch's `Ratelimit-Reset` epoch.
pub fn retry_after(headers: &HeaderMap, now_epoch: i64) -> Duration {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    if let Some(seconds) = header("retry-after") {
        return Duration::from_secs(seconds.max(0) as u64);
    }
    if let Some(reset) = header("ratelimit-reset") {
        return Duration::from_secs((reset - now_epoch).max(1) as u64);
    }
    DEFAULT_RETRY_AFTER
}

fn now_epoch() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Error for a failed Helix call. Only 429 is special here; token-endpoint
/// semantics do not apply to API calls.
fn helix_error(status: StatusCode, headers: &HeaderMap, body: &str) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ProviderError::RateLimited {
            retry_after: retry_after(headers, now_epoch()),
        };
    }
    ProviderError::Upstream {
        status: status.as_u16(),
        message: error_message(body),
    }
}

pub struct TwitchClient {
    http_client: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    signin_redirect_uri: String,
    webhook_callback_url: String,
    webhook_secret: String,
}

impl TwitchClient {
    const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
    const HELIX_URL: &str = "https://api.twitch.tv/helix";

    pub fn new(config: &TwitchConfig) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            signin_redirect_uri: config.signin_redirect_uri.clone(),
            webhook_callback_url: config.webhook_callback_url.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenGrant, ProviderError> {
        let mut form = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        form.extend_from_slice(params);

        let response = self
            .http_client
            .post(Self::TOKEN_URL)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let wait = retry_after(response.headers(), now_epoch());
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::from_token_response(status.as_u16(), &body, wait))
    }

    async fn authorization_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, ProviderError> {
        self.token_request(&[
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    /// Exchange a streamer sign-in code.
    pub async fn exchange_signin_code(&self, code: &str) -> Result<TokenGrant, ProviderError> {
        self.authorization_code(code, &self.signin_redirect_uri).await
    }

    /// Client-credentials token for app-level calls such as EventSub.
    pub async fn app_access_token(&self) -> Result<String, ProviderError> {
        let response = self
            .http_client
            .post(Self::TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let wait = retry_after(response.headers(), now_epoch());
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_token_response(status.as_u16(), &body, wait));
        }
        let token: AppToken = response.json().await?;
        Ok(token.access_token)
    }

    /// The user behind `access_token`.
    pub async fn get_user(&self, access_token: &str) -> Result<TwitchUser, ProviderError> {
        let response = self
            .http_client
            .get(format!("{}/users", Self::HELIX_URL))
            .bearer_auth(access_token)
            .header("Client-Id", &self.client_id)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(helix_error(status, &headers, &body));
        }

        let users: HelixData<TwitchUser> = response.json().await?;
        users.data.into_iter().next().ok_or(ProviderError::Upstream {
            status: status.as_u16(),
            message: "no user data returned".to_string(),
        })
    }

    /// Create the channel point reward viewers redeem for tokens.
    pub async fn create_custom_reward(
        &self,
        access_token: &str,
        broadcaster_id: &str,
        title: &str,
        prompt: &str,
        cost: u32,
    ) -> Result<CustomReward, ProviderError> {
        let response = self
            .http_client
            .post(format!("{}/channel_points/custom_rewards", Self::HELIX_URL))
            .query(&[("broadcaster_id", broadcaster_id)])
            .bearer_auth(access_token)
            .header("Client-Id", &self.client_id)
            .json(&CreateRewardBody {
                title,
                cost,
                prompt,
                is_enabled: true,
                background_color: "#9146FF",
                is_user_input_required: false,
                should_redemptions_skip_request_queue: true,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(helix_error(status, &headers, &body));
        }

        let rewards: HelixData<CustomReward> = response.json().await?;
        let reward = rewards.data.into_iter().next().ok_or(ProviderError::Upstream {
            status: status.as_u16(),
            message: "no reward returned".to_string(),
        })?;
        info!(%broadcaster_id, reward_id = %reward.id, "Custom reward created");
        Ok(reward)
    }

    /// Subscribe our webhook to redemptions of `reward_id`.
    pub async fn subscribe_reward_redemptions(
        &self,
        app_token: &str,
        broadcaster_id: &str,
        reward_id: &str,
    ) -> Result<(), ProviderError> {
        let body = serde_json::json!({
            "type": CHANNEL_POINTS_REDEMPTION_ADD,
            "version": "1",
            "condition": {
                "broadcaster_user_id": broadcaster_id,
                "reward_id": reward_id,
            },
            "transport": {
                "method": "webhook",
                "callback": self.webhook_callback_url,
                "secret": self.webhook_secret,
            },
        });

        let response = self
            .http_client
            .post(format!("{}/eventsub/subscriptions", Self::HELIX_URL))
            .bearer_auth(app_token)
            .header("Client-Id", &self.client_id)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        // 409: the subscription already exists.
        if status.is_success() || status == StatusCode::CONFLICT {
            debug!(%broadcaster_id, %reward_id, "EventSub subscription in place");
            return Ok(());
        }
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(helix_error(status, &headers, &body))
    }
}

#[async_trait]
impl OAuthProvider for TwitchClient {
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError> {
        self.authorization_code(code, &self.redirect_uri).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn fetch_login(&self, access_token: &str) -> Result<String, ProviderError> {
        self.get_user(access_token).await.map(|user| user.login)
    }
}
