//! Bot account authorization.
//!
//! - `GET /auth`       – OAuth redirect target for authorizing the bot account
//! - `GET /bot/status` – where the token lifecycle stands

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use itemdrop_core::auth::TokenError;
use itemdrop_sdk::objects::{BotState, BotStatus};
use serde::Deserialize;

use super::extractors::AdminAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth", get(authorize_bot))
        .route("/bot/status", get(bot_status))
}

#[derive(Debug, Default, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Plain-text status for each way the bot authorization can end.
fn authorization_failure(error: &TokenError) -> (StatusCode, &'static str) {
    match error {
        TokenError::AuthorizationRejected { .. } => (
            StatusCode::FORBIDDEN,
            "This account is not the configured bot account",
        ),
        TokenError::ConfigurationError(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Twitch client is misconfigured",
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error obtaining Twitch token",
        ),
    }
}

/// `GET /auth?code=` — complete the bot authorization.
async fn authorize_bot(
    State(state): State<AppState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        tracing::warn!(%error, %description, "Bot authorization denied");
        return (
            StatusCode::BAD_REQUEST,
            format!("Authentication error: {description}"),
        )
            .into_response();
    }

    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Authorization code missing").into_response();
    };

    match state.tokens.complete_authorization(&code).await {
        Ok(()) => (StatusCode::OK, "Bot authorized successfully").into_response(),
        Err(e) => {
            match &e {
                TokenError::AuthorizationRejected { .. } => {
                    tracing::warn!(error = %e, "Bot authorization rejected")
                }
                _ => tracing::error!(error = %e, "Bot authorization failed"),
            }
            authorization_failure(&e).into_response()
        }
    }
}

/// `GET /bot/status` — state of the bot token.
async fn bot_status(State(state): State<AppState>, _auth: AdminAuth) -> Json<BotStatus> {
    let bot_state = state.tokens.state().await;
    Json(BotStatus {
        state: bot_state,
        authorized: bot_state == BotState::Active || bot_state == BotState::Refreshing,
    })
}
