//! HTTP API.
//!
//! - Viewer API: `/tokens`, `/items`, `/redeem` (extension JWT)
//! - Streamer API: `/streamer/*` and the `/events` stream (session JWT)
//! - Sign-in, sign-up and bot OAuth: `/signin`, `/signup`, `/auth`, `/bot/status`
//! - EventSub: `/webhook/twitch`
//! - Admin API: `/admin/*` (admin secret header)

pub mod admin;
pub mod bot;
pub mod events;
pub mod extractors;
pub mod session;
pub mod signin;
pub mod signup;
pub mod streamer;
pub mod viewer;
pub mod webhook;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use itemdrop_sdk::objects::ApiError;

/// A JSON `{"error": ...}` response.
pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiError::new(message))).into_response()
}

/// Log an infrastructure failure and answer a generic 500.
pub(crate) fn internal_error(context: &str, error: &dyn std::fmt::Display) -> Response {
    tracing::error!(error = %error, "{}", context);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}
