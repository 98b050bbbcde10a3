//! Viewer API.
//!
//! Called by the Twitch extension with the viewer's extension JWT.
//!
//! - `GET  /tokens?streamerId=` – the viewer's live tokens for a streamer
//! - `GET  /items?streamerId=`  – the streamer's effective item catalog
//! - `POST /redeem`             – spend tokens to spawn an item

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use itemdrop_core::catalog::{CatalogError, list_effective_items};
use itemdrop_core::entities::tokens::{PLATFORM_TWITCH, Token};
use itemdrop_core::redemption::{RedeemError, RedemptionEngine};
use itemdrop_core::store::TokenStore;
use itemdrop_sdk::objects::{EffectiveItem, RedeemRequest, StreamerQuery, TokenView};

use super::extractors::ViewerSession;
use super::{error_response, internal_error};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tokens", get(list_tokens))
        .route("/items", get(list_items))
        .route("/redeem", post(redeem))
}

/// Errors that can occur in Viewer API handlers.
#[derive(Debug)]
pub(crate) enum ViewerApiError {
    MissingStreamerId,
    Redeem(RedeemError),
    Catalog(CatalogError),
    Database(sqlx::Error),
}

impl From<RedeemError> for ViewerApiError {
    fn from(e: RedeemError) -> Self {
        ViewerApiError::Redeem(e)
    }
}

impl From<CatalogError> for ViewerApiError {
    fn from(e: CatalogError) -> Self {
        ViewerApiError::Catalog(e)
    }
}

impl IntoResponse for ViewerApiError {
    fn into_response(self) -> Response {
        match self {
            ViewerApiError::MissingStreamerId => {
                error_response(StatusCode::BAD_REQUEST, "streamerId is required")
            }
            ViewerApiError::Redeem(e) => redeem_error_response(e),
            ViewerApiError::Catalog(CatalogError::Database(e)) | ViewerApiError::Database(e) => {
                internal_error("Viewer API database error", &e)
            }
            ViewerApiError::Catalog(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        }
    }
}

fn redeem_error_status(error: &RedeemError) -> StatusCode {
    match error {
        RedeemError::StreamerNotFound(_) | RedeemError::ItemNotFound(_) => StatusCode::NOT_FOUND,
        RedeemError::ConsumerNotConnected => StatusCode::CONFLICT,
        RedeemError::ItemsDisabled => StatusCode::FORBIDDEN,
        RedeemError::InsufficientTokens { .. } => StatusCode::BAD_REQUEST,
        RedeemError::Delivery(_) => StatusCode::BAD_GATEWAY,
        RedeemError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn redeem_error_response(error: RedeemError) -> Response {
    match error {
        RedeemError::Database(e) => internal_error("Redemption database error", &e),
        RedeemError::Delivery(_) => error_response(
            StatusCode::BAD_GATEWAY,
            "the item could not be delivered to the game",
        ),
        other => error_response(redeem_error_status(&other), other.to_string()),
    }
}

fn token_view(token: Token) -> TokenView {
    TokenView {
        id: token.id,
        viewer_id: token.viewer_id,
        streamer_id: token.streamer_id,
        platform: token.platform,
        source: token.source.into(),
        source_event_id: token.source_event_id,
        created_at: token.created_at.assume_utc().unix_timestamp(),
    }
}

fn required_streamer_id(query: StreamerQuery) -> Result<String, ViewerApiError> {
    query
        .streamer_id
        .filter(|id| !id.is_empty())
        .ok_or(ViewerApiError::MissingStreamerId)
}

/// `GET /tokens?streamerId=` — live tokens the viewer can spend on this streamer.
async fn list_tokens(
    State(state): State<AppState>,
    ViewerSession(viewer): ViewerSession,
    Query(query): Query<StreamerQuery>,
) -> Result<Json<Vec<TokenView>>, ViewerApiError> {
    let streamer_id = required_streamer_id(query)?;

    let tokens = state
        .processor()
        .live_tokens(&viewer.twitch_profile_id, &streamer_id, PLATFORM_TWITCH)
        .await
        .map_err(ViewerApiError::Database)?;

    Ok(Json(tokens.into_iter().map(token_view).collect()))
}

/// `GET /items?streamerId=` — what the viewer can spawn on this streamer's game.
async fn list_items(
    State(state): State<AppState>,
    _viewer: ViewerSession,
    Query(query): Query<StreamerQuery>,
) -> Result<Json<Vec<EffectiveItem>>, ViewerApiError> {
    let streamer_id = required_streamer_id(query)?;
    let items = list_effective_items(&state.processor(), &streamer_id).await?;
    Ok(Json(items))
}

/// `POST /redeem` — spend tokens on an item.
async fn redeem(
    State(state): State<AppState>,
    ViewerSession(viewer): ViewerSession,
    Json(request): Json<RedeemRequest>,
) -> Result<StatusCode, ViewerApiError> {
    let processor = state.processor();
    RedemptionEngine::new(&processor, &state.fanout)
        .redeem(&viewer, &request)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
