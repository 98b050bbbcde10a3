//! Streamer sign-in.
//!
//! `GET /signin?code=` is the OAuth redirect target for streamers. A new
//! streamer is created with the default item set, and the channel point
//! reward plus its EventSub subscription are set up once per streamer.
//! The flow always ends in a redirect to the companion app's callback URL,
//! carrying either a session token or an error message.

use axum::{
    Router,
    extract::{Query, State},
    response::Redirect,
    routing::get,
};
use itemdrop_core::auth::ProviderError;
use itemdrop_core::catalog::CatalogError;
use itemdrop_core::entities::streamers::Streamer;
use itemdrop_core::onboarding::find_or_create_streamer;
use itemdrop_core::store::PartyStore;
use serde::Deserialize;
use thiserror::Error;

use super::session::{IssuedSession, SessionTokens};
use crate::state::AppState;

pub const SIGNIN_FAILED: &str = "Error during signin process";
pub const MALFORMED_REQUEST: &str = "Malformed OAuth Request";

pub fn router() -> Router<AppState> {
    Router::new().route("/signin", get(sign_in))
}

#[derive(Debug, Default, Deserialize)]
pub struct SigninQuery {
    pub code: Option<String>,
}

#[derive(Debug, Error)]
enum SigninError {
    #[error("twitch request failed: {0}")]
    Twitch(#[from] ProviderError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("session token error: {0}")]
    Session(#[from] jsonwebtoken::errors::Error),
}

/// Append query parameters to the app callback URL.
fn callback_url(base: &str, params: &[(&str, &str)]) -> String {
    let query = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{query}")
}

async fn sign_in(State(state): State<AppState>, Query(query): Query<SigninQuery>) -> Redirect {
    let app_callback_url = state.config.session.read().await.app_callback_url.clone();

    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return Redirect::to(&callback_url(&app_callback_url, &[("error", MALFORMED_REQUEST)]));
    };

    match complete_sign_in(&state, &code).await {
        Ok(session) => {
            let expires_at = session.expires_at.to_string();
            Redirect::to(&callback_url(
                &app_callback_url,
                &[("token", session.token.as_str()), ("expires_at", expires_at.as_str())],
            ))
        }
        Err(e) => {
            tracing::error!(error = %e, "Error during signin process");
            Redirect::to(&callback_url(&app_callback_url, &[("error", SIGNIN_FAILED)]))
        }
    }
}

async fn complete_sign_in(state: &AppState, code: &str) -> Result<IssuedSession, SigninError> {
    let grant = state.twitch.exchange_signin_code(code).await?;
    let user = state.twitch.get_user(&grant.access_token).await?;

    let processor = state.processor();
    let signed_in = find_or_create_streamer(&processor, &user.id, &user.display_name).await?;
    let streamer = signed_in.streamer;

    if !streamer.channel_point_reward_created {
        set_up_reward(state, &streamer, &grant.access_token).await?;
    }

    let session = state.config.session.read().await.clone();
    let issued = SessionTokens::new(&session.jwt_secret).issue(
        &streamer.twitch_profile_id,
        &streamer.display_name,
        session.ttl,
    )?;
    tracing::info!(streamer_id = %streamer.twitch_profile_id, "Streamer signed in");
    Ok(issued)
}

/// Create the token reward and subscribe to its redemptions.
async fn set_up_reward(
    state: &AppState,
    streamer: &Streamer,
    access_token: &str,
) -> Result<(), SigninError> {
    let (title, prompt, cost) = {
        let twitch = state.config.twitch.read().await;
        (twitch.reward_title(), twitch.reward_prompt(), twitch.reward_cost)
    };
    let broadcaster_id = streamer.twitch_profile_id.as_str();

    match state
        .twitch
        .create_custom_reward(access_token, broadcaster_id, &title, &prompt, cost)
        .await
    {
        Ok(reward) => {
            let app_token = state.twitch.app_access_token().await?;
            state
                .twitch
                .subscribe_reward_redemptions(&app_token, broadcaster_id, &reward.id)
                .await?;
        }
        Err(e) if e.is_duplicate_reward() => {
            tracing::info!(%broadcaster_id, "Token reward already exists");
        }
        Err(e) => return Err(e.into()),
    }

    state.processor().mark_reward_created(broadcaster_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_url_with_token() {
        let url = callback_url(
            "smash-factory://callback",
            &[("token", "a.b+c/d"), ("expires_at", "1700000000")],
        );
        assert_eq!(
            url,
            "smash-factory://callback?token=a.b%2Bc%2Fd&expires_at=1700000000"
        );
    }

    #[test]
    fn test_callback_url_with_error() {
        assert_eq!(
            callback_url("smash-factory://callback", &[("error", SIGNIN_FAILED)]),
            "smash-factory://callback?error=Error%20during%20signin%20process"
        );
        assert_eq!(
            callback_url("https://app.example.com/cb?v=2", &[("error", MALFORMED_REQUEST)]),
            "https://app.example.com/cb?v=2&error=Malformed%20OAuth%20Request"
        );
    }
}
