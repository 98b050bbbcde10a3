//! Custom Axum extractors for request authentication.
//!
//! Provides:
//! - `ViewerSession` — the viewer behind a Twitch extension JWT
//!   (`Authorization: Bearer`), created on first sight.
//! - `StreamerSession` — the streamer behind a session JWT, read from the
//!   `Authorization` header or a `?token=` query parameter.
//! - `AdminAuth` — the plaintext admin secret in `Itemdrop-Admin-Authorization`.

use axum::{
    extract::{FromRequestParts, Query},
    http::{HeaderMap, StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use itemdrop_core::entities::streamers::Streamer;
use itemdrop_core::entities::viewers::Viewer;
use itemdrop_core::store::PartyStore;
use itemdrop_sdk::signature::ADMIN_AUTH_HEADER;
use serde::Deserialize;

use super::session::{SessionTokens, verify_extension_token};
use super::{error_response, internal_error};
use crate::state::AppState;

/// Extract a bearer token from the `Authorization` header.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth = headers.get("authorization")?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// The `token` query parameter, if any.
fn query_token(parts: &Parts) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()?
        .0
        .token
        .filter(|t| !t.is_empty())
}

/// Errors returned by the authentication extractors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing access token")]
    MissingToken,
    #[error("Invalid Access Token")]
    InvalidViewerToken,
    #[error("Invalid User")]
    AnonymousViewer,
    #[error("Invalid token")]
    InvalidSession,
    #[error("Invalid streamer")]
    UnknownStreamer,
    #[error("missing admin authorization")]
    MissingAdminSecret,
    #[error("invalid admin authorization")]
    InvalidAdminSecret,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::MissingToken
            | AuthError::InvalidSession
            | AuthError::UnknownStreamer
            | AuthError::MissingAdminSecret => StatusCode::UNAUTHORIZED,
            AuthError::InvalidViewerToken | AuthError::AnonymousViewer => StatusCode::BAD_REQUEST,
            AuthError::InvalidAdminSecret => StatusCode::FORBIDDEN,
            AuthError::Database(e) => return internal_error("Authentication lookup failed", e),
        };
        error_response(status, self.to_string())
    }
}

// ---------------------------------------------------------------------------
// ViewerSession
// ---------------------------------------------------------------------------

/// The authenticated viewer.
pub struct ViewerSession(pub Viewer);

impl FromRequestParts<AppState> for ViewerSession {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or(AuthError::MissingToken)?;

        let secret = state.config.twitch.read().await.extension_secret.clone();
        let claims = verify_extension_token(&secret, &token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected extension token");
            AuthError::InvalidViewerToken
        })?;

        let user_id = claims
            .user_id
            .filter(|id| !id.is_empty())
            .ok_or(AuthError::AnonymousViewer)?;

        let viewer = state.processor().ensure_viewer(&user_id).await?;
        Ok(ViewerSession(viewer))
    }
}

// ---------------------------------------------------------------------------
// StreamerSession
// ---------------------------------------------------------------------------

/// The signed-in streamer.
pub struct StreamerSession(pub Streamer);

impl FromRequestParts<AppState> for StreamerSession {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // EventSource cannot set headers, so the stream passes the token in the query.
        let token = extract_bearer_token(&parts.headers)
            .or_else(|| query_token(parts))
            .ok_or(AuthError::MissingToken)?;

        let tokens = SessionTokens::new(&state.config.session.read().await.jwt_secret);
        let claims = tokens.verify(&token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected session token");
            AuthError::InvalidSession
        })?;

        let streamer = state
            .processor()
            .find_streamer(&claims.sub)
            .await?
            .ok_or(AuthError::UnknownStreamer)?;
        Ok(StreamerSession(streamer))
    }
}

// ---------------------------------------------------------------------------
// AdminAuth
// ---------------------------------------------------------------------------

/// Marker for requests carrying the admin secret.
pub struct AdminAuth;

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secret = parts
            .headers
            .get(ADMIN_AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingAdminSecret)?;

        if !state.config.admin.read().await.verify_secret(secret) {
            tracing::warn!("Admin request with wrong secret");
            return Err(AuthError::InvalidAdminSecret);
        }
        Ok(AdminAuth)
    }
}
