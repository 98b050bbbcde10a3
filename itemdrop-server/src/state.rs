//! Application state shared across all request handlers.

use itemdrop_core::auth::TokenLifecycleManager;
use itemdrop_core::config::SharedConfig;
use itemdrop_core::fanout::FanoutRegistry;
use itemdrop_core::framework::DatabaseProcessor;
use itemdrop_core::ingestion::RewardParser;
use itemdrop_core::twitch::TwitchClient;
use sqlx::PgPool;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Configuration sections (reloaded via SIGHUP).
    pub config: SharedConfig,
    /// The bot's access token.
    pub tokens: TokenLifecycleManager,
    /// Live event stream consumers, keyed by channel id.
    pub fanout: Arc<FanoutRegistry>,
    pub twitch: Arc<TwitchClient>,
    /// Token amounts in reward titles and bits SKUs.
    pub parser: Arc<RewardParser>,
}

impl AppState {
    pub fn processor(&self) -> DatabaseProcessor {
        DatabaseProcessor {
            pool: self.db.clone(),
        }
    }
}
