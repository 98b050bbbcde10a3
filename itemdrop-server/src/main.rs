//! Item Drop Server
//!
//! Backend for a stream extension where viewers spend tokens earned with
//! channel points or bits to spawn items in the streamer's game.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use itemdrop_core::auth::{TokenLifecycleManager, TokioTimer};
use itemdrop_core::fanout::FanoutRegistry;
use itemdrop_core::framework::DatabaseProcessor;
use itemdrop_core::ingestion::RewardParser;
use itemdrop_core::twitch::TwitchClient;
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Item Drop - channel point and bits powered item spawns
#[derive(Parser, Debug)]
#[command(name = "itemdrop-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./itemdrop-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:5000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting itemdrop-server v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = loaded_config.server.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let twitch_client = Arc::new(TwitchClient::new(&loaded_config.twitch));
    let reward_parser = Arc::new(RewardParser::new(&loaded_config.twitch.token_unit_name)?);
    let bot_account = loaded_config.twitch.bot_account.clone();

    let shared_config = loaded_config.into_shared();

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let tokens = TokenLifecycleManager::new(
        twitch_client.clone(),
        Arc::new(DatabaseProcessor::new(db_pool.clone())),
        Arc::new(TokioTimer),
        bot_account,
    );
    tokens.initialize().await;
    match tokens.get_valid_access_credential().await {
        Ok(Some(_)) => tracing::info!("Bot access token ready"),
        Ok(None) => tracing::warn!("Bot is not authorized yet, visit the bot OAuth flow"),
        Err(e) => tracing::error!(error = %e, "Bot token unavailable, chat features stay inert"),
    }

    let state = AppState {
        db: db_pool.clone(),
        config: shared_config,
        tokens,
        fanout: Arc::new(FanoutRegistry::new()),
        twitch: twitch_client,
        parser: reward_parser,
    };

    // Spawn config reload handler (listens for SIGHUP)
    let shutdown_notify = spawn_config_reload_handler(state.clone(), config_loader);

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Signal the config reload handler to stop
    shutdown_notify.notify_one();

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
