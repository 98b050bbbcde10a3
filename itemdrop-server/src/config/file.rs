//! TOML file configuration structures.
//!
//! These structs directly map to the `itemdrop-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub twitch: TwitchConfig,
    pub session: SessionConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:5000").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

/// Admin configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// The admin secret. If this is plaintext (doesn't start with `$argon2`),
    /// it will be hashed and the config file will be rewritten.
    pub secret: String,
}

/// Twitch application section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitchConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URI registered for the bot authorization flow.
    pub redirect_uri: String,
    /// Redirect URI registered for streamer sign-in.
    pub signin_redirect_uri: String,
    pub webhook_secret: String,
    /// Public URL of `/webhook/twitch`, given to EventSub.
    pub webhook_callback_url: String,
    /// Base64 extension secret used to sign viewer JWTs.
    pub extension_secret: String,
    /// Login the bot must authorize as.
    pub bot_account: String,
    #[serde(default = "default_token_unit_name")]
    pub token_unit_name: String,
    #[serde(default = "default_reward_cost")]
    pub reward_cost: u32,
    #[serde(default = "default_reward_token_amount")]
    pub reward_token_amount: u32,
}

fn default_token_unit_name() -> String {
    "Smash Factory Token".to_string()
}

fn default_reward_cost() -> u32 {
    1000
}

fn default_reward_token_amount() -> u32 {
    100
}

/// Streamer session section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub jwt_secret: String,
    #[serde(default = "default_app_callback_url")]
    pub app_callback_url: String,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u32,
}

fn default_app_callback_url() -> String {
    "smash-factory://callback".to_string()
}

fn default_ttl_hours() -> u32 {
    24
}

impl FileConfig {
    /// Check if the admin secret is already hashed (argon2 format).
    pub fn is_admin_secret_hashed(&self) -> bool {
        self.admin.secret.starts_with("$argon2")
    }
}
