//! Streamer sign-up from the Twitch extension.
//!
//! `POST /signup` `{token}` creates the streamer behind an extension JWT,
//! with the default item set. OAuth sign-in creates streamers as well; this
//! route is for the extension's config view, which only holds the extension
//! token.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use itemdrop_core::catalog::CatalogError;
use itemdrop_core::onboarding::find_or_create_streamer;
use itemdrop_sdk::objects::StreamerProfile;
use serde::Deserialize;
use thiserror::Error;

use super::session::verify_extension_token;
use super::streamer::streamer_profile;
use super::{error_response, internal_error};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/signup", post(sign_up))
}

#[derive(Debug, Default, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Error)]
pub(crate) enum SignupError {
    #[error("Token is required")]
    MissingToken,
    #[error("Invalid Access Token")]
    InvalidToken,
    #[error("Invalid User")]
    AnonymousUser,
    #[error("Streamer already exists")]
    AlreadyExists,
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl IntoResponse for SignupError {
    fn into_response(self) -> Response {
        match self {
            SignupError::Catalog(e) => internal_error("Sign-up failed", &e),
            other => error_response(StatusCode::BAD_REQUEST, other.to_string()),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct SignupIdentity {
    user_id: String,
    display_name: String,
}

fn signup_identity(secret: &str, request: &SignupRequest) -> Result<SignupIdentity, SignupError> {
    let token = request
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(SignupError::MissingToken)?;

    let claims = verify_extension_token(secret, token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected extension token");
        SignupError::InvalidToken
    })?;

    let user_id = claims
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or(SignupError::AnonymousUser)?;
    let display_name = claims
        .user_name
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| user_id.clone());

    Ok(SignupIdentity {
        user_id,
        display_name,
    })
}

/// `POST /signup`
async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<Json<StreamerProfile>, SignupError> {
    let secret = state.config.twitch.read().await.extension_secret.clone();
    let identity = signup_identity(&secret, &request)?;

    let signed_up =
        find_or_create_streamer(&state.processor(), &identity.user_id, &identity.display_name)
            .await?;
    if !signed_up.created {
        return Err(SignupError::AlreadyExists);
    }

    tracing::info!(streamer_id = %identity.user_id, "Streamer signed up from the extension");
    Ok(Json(streamer_profile(signed_up.streamer)))
}
