//! Signal handling for graceful shutdown and config reload.

use crate::config::ConfigLoader;
use crate::state::AppState;
use std::sync::Arc;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::Notify;

fn install(kind: SignalKind, name: &str) -> Option<Signal> {
    match signal(kind) {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::error!(error = %e, "Failed to install {} handler", name);
            None
        }
    }
}

async fn recv(stream: &mut Option<Signal>) {
    match stream {
        Some(stream) => {
            stream.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let mut sigterm = install(SignalKind::terminate(), "SIGTERM");
    let mut sigint = install(SignalKind::interrupt(), "SIGINT");

    tokio::select! {
        _ = recv(&mut sigterm) => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = recv(&mut sigint) => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Spawns a task that listens for SIGHUP and reloads the configuration.
///
/// The token lifecycle manager and Twitch client keep the settings they were
/// built with; only the shared sections are swapped.
///
/// Returns a Notify that can be used to signal when shutdown is complete.
pub fn spawn_config_reload_handler(state: AppState, config_loader: Arc<ConfigLoader>) -> Arc<Notify> {
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();

    tokio::spawn(async move {
        let mut sighup = install(SignalKind::hangup(), "SIGHUP");

        loop {
            tokio::select! {
                _ = recv(&mut sighup) => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded_config) => {
                            *state.config.server.write().await = loaded_config.server;
                            *state.config.admin.write().await = loaded_config.admin;
                            *state.config.twitch.write().await = loaded_config.twitch;
                            *state.config.session.write().await = loaded_config.session;
                            tracing::info!("Configuration reloaded successfully");
                        }
                        Err(e) => {
                            tracing::error!("Failed to reload configuration: {}", e);
                        }
                    }
                }
                _ = shutdown_notify_clone.notified() => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
            }
        }
    });

    shutdown_notify
}
