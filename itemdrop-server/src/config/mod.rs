//! Configuration module for itemdrop-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles admin secret hashing.

pub mod file;

use crate::config::file::{
    FileConfig, SessionConfig as FileSessionConfig, TwitchConfig as FileTwitchConfig,
};
use itemdrop_core::config::{AdminConfig, ServerConfig, SessionConfig, SharedConfig, TwitchConfig};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub twitch: TwitchConfig,
    pub session: SessionConfig,
}

impl LoadedConfig {
    /// Convert into a SharedConfig with Arc<RwLock<T>> wrappers.
    pub fn into_shared(self) -> SharedConfig {
        SharedConfig {
            server: Arc::new(RwLock::new(self.server)),
            admin: Arc::new(RwLock::new(self.admin)),
            twitch: Arc::new(RwLock::new(self.twitch)),
            session: Arc::new(RwLock::new(self.session)),
        }
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Hash the admin secret if it's plaintext (and rewrite the file)
    /// 5. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;

        let secret_hash = if file_config.is_admin_secret_hashed() {
            file_config.admin.secret.clone()
        } else {
            let hash = hash_secret(&file_config.admin.secret)?;
            file_config.admin.secret = hash.clone();
            self.rewrite_config(&file_config)?;
            tracing::info!("Admin secret hashed and config file updated");
            hash
        };

        Ok(build_loaded_config(file_config, secret_hash))
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write atomically: write to temp file, then rename
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let required = [
        ("admin.secret", &config.admin.secret),
        ("twitch.client_id", &config.twitch.client_id),
        ("twitch.client_secret", &config.twitch.client_secret),
        ("twitch.webhook_secret", &config.twitch.webhook_secret),
        ("twitch.extension_secret", &config.twitch.extension_secret),
        ("twitch.bot_account", &config.twitch.bot_account),
        ("session.jwt_secret", &config.session.jwt_secret),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!("{name} must not be empty")));
        }
    }
    if config.twitch.reward_token_amount == 0 {
        return Err(ConfigError::ValidationError(
            "twitch.reward_token_amount must be positive".to_string(),
        ));
    }
    if config.session.ttl_hours == 0 {
        return Err(ConfigError::ValidationError(
            "session.ttl_hours must be positive".to_string(),
        ));
    }
    Ok(())
}

fn hash_secret(plaintext: &str) -> Result<String, ConfigError> {
    use argon2::{
        Argon2, PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ConfigError::HashError(e.to_string()))
}

fn build_loaded_config(file_config: FileConfig, secret_hash: String) -> LoadedConfig {
    LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
        },
        admin: AdminConfig::new(secret_hash),
        twitch: convert_twitch(file_config.twitch),
        session: convert_session(file_config.session),
    }
}

fn convert_twitch(t: FileTwitchConfig) -> TwitchConfig {
    TwitchConfig {
        client_id: t.client_id,
        client_secret: t.client_secret,
        redirect_uri: t.redirect_uri,
        signin_redirect_uri: t.signin_redirect_uri,
        webhook_secret: t.webhook_secret,
        webhook_callback_url: t.webhook_callback_url,
        extension_secret: t.extension_secret,
        bot_account: t.bot_account,
        token_unit_name: t.token_unit_name,
        reward_cost: t.reward_cost,
        reward_token_amount: t.reward_token_amount,
    }
}

fn convert_session(s: FileSessionConfig) -> SessionConfig {
    SessionConfig {
        jwt_secret: s.jwt_secret,
        app_callback_url: s.app_callback_url,
        ttl: time::Duration::hours(i64::from(s.ttl_hours)),
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
