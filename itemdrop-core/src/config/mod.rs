//! Runtime configuration for the item drop service.
//!
//! These are the validated sections shared between crates. Loading and
//! parsing the TOML file happens in the server crate.

mod admin;
mod server;
mod session;
mod twitch;

pub use admin::AdminConfig;
pub use server::ServerConfig;
pub use session::SessionConfig;
pub use twitch::TwitchConfig;

use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared configuration state with separate locks for each section.
#[derive(Clone)]
pub struct SharedConfig {
    /// Listen address.
    pub server: Arc<RwLock<ServerConfig>>,
    /// Admin API authentication.
    pub admin: Arc<RwLock<AdminConfig>>,
    /// Twitch application credentials and reward settings.
    pub twitch: Arc<RwLock<TwitchConfig>>,
    /// Streamer session tokens.
    pub session: Arc<RwLock<SessionConfig>>,
}
