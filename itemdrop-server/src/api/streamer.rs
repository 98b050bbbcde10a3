//! Streamer API.
//!
//! Requires a streamer session JWT.
//!
//! - `PUT /streamer/items-enabled`   – master switch for item spawns
//! - `PUT /streamer/items/{item_id}` – change one item's override
//! - `GET /streamer/items`           – the streamer's effective catalog

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
};
use itemdrop_core::catalog::{CatalogError, list_effective_items, update_item_override};
use itemdrop_core::entities::streamer_items::StreamerItem;
use itemdrop_core::entities::streamers::Streamer;
use itemdrop_core::store::PartyStore;
use itemdrop_sdk::objects::{
    EffectiveItem, ItemOverride, ItemsEnabledRequest, StreamerProfile, UpdateItemOverrideRequest,
};

use super::extractors::StreamerSession;
use super::{error_response, internal_error};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/items-enabled", put(set_items_enabled))
        .route("/items", get(list_items))
        .route("/items/{item_id}", put(update_item))
}

/// Errors that can occur in Streamer API handlers.
#[derive(Debug)]
pub(crate) enum StreamerApiError {
    Catalog(CatalogError),
    NotFound,
}

impl From<CatalogError> for StreamerApiError {
    fn from(e: CatalogError) -> Self {
        StreamerApiError::Catalog(e)
    }
}

impl From<sqlx::Error> for StreamerApiError {
    fn from(e: sqlx::Error) -> Self {
        StreamerApiError::Catalog(CatalogError::Database(e))
    }
}

impl IntoResponse for StreamerApiError {
    fn into_response(self) -> Response {
        match self {
            StreamerApiError::Catalog(CatalogError::Database(e)) => {
                internal_error("Streamer API database error", &e)
            }
            StreamerApiError::Catalog(e @ CatalogError::ItemNotFound(_)) => {
                error_response(StatusCode::NOT_FOUND, e.to_string())
            }
            StreamerApiError::Catalog(e @ CatalogError::InvalidPrice(_)) => {
                error_response(StatusCode::BAD_REQUEST, e.to_string())
            }
            StreamerApiError::NotFound => {
                error_response(StatusCode::NOT_FOUND, "streamer not found")
            }
        }
    }
}

pub(crate) fn streamer_profile(streamer: Streamer) -> StreamerProfile {
    StreamerProfile {
        twitch_profile_id: streamer.twitch_profile_id,
        display_name: streamer.display_name,
        items_enabled: streamer.items_enabled,
        channel_point_reward_created: streamer.channel_point_reward_created,
    }
}

fn item_override(item: StreamerItem) -> ItemOverride {
    ItemOverride {
        streamer_id: item.streamer_id,
        master_item_id: item.master_item_id,
        enabled: item.enabled,
        price: item.price,
    }
}

/// `PUT /streamer/items-enabled`
async fn set_items_enabled(
    State(state): State<AppState>,
    StreamerSession(streamer): StreamerSession,
    Json(request): Json<ItemsEnabledRequest>,
) -> Result<Json<StreamerProfile>, StreamerApiError> {
    let updated = state
        .processor()
        .set_items_enabled(&streamer.twitch_profile_id, request.items_enabled)
        .await?
        .ok_or(StreamerApiError::NotFound)?;

    tracing::info!(
        streamer_id = %updated.twitch_profile_id,
        items_enabled = updated.items_enabled,
        "Streamer toggled items"
    );
    Ok(Json(streamer_profile(updated)))
}

/// `GET /streamer/items`
async fn list_items(
    State(state): State<AppState>,
    StreamerSession(streamer): StreamerSession,
) -> Result<Json<Vec<EffectiveItem>>, StreamerApiError> {
    let items = list_effective_items(&state.processor(), &streamer.twitch_profile_id).await?;
    Ok(Json(items))
}

/// `PUT /streamer/items/{item_id}`
async fn update_item(
    State(state): State<AppState>,
    StreamerSession(streamer): StreamerSession,
    Path(item_id): Path<i32>,
    Json(request): Json<UpdateItemOverrideRequest>,
) -> Result<Json<ItemOverride>, StreamerApiError> {
    let updated = update_item_override(
        &state.processor(),
        &streamer.twitch_profile_id,
        item_id,
        request.enabled,
        request.price,
    )
    .await?;
    Ok(Json(item_override(updated)))
}
