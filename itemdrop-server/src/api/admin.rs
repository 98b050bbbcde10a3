//! Admin API handlers.
//!
//! These endpoints require the `Itemdrop-Admin-Authorization` header with
//! the plaintext admin secret.
//!
//! # Endpoints
//!
//! - `PUT  /master-items`                           – upsert master items by item id
//! - `POST /streamers/{profile_id}/provision-items` – add missing default items
//! - `POST /tokens/gift`                            – gift tokens to a viewer

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{post, put},
};
use itemdrop_core::catalog::{CatalogError, provision_default_items};
use itemdrop_core::entities::master_items::{MasterItem, UpsertMasterItems};
use itemdrop_core::ingestion::{IngestError, gift_tokens};
use itemdrop_core::store::PartyStore;
use itemdrop_sdk::objects::{GiftTokensRequest, GiftTokensResponse, ItemOverride, MasterItemUpsert};
use kanau::processor::Processor;
use serde::Serialize;

use super::extractors::AdminAuth;
use super::{error_response, internal_error};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/master-items", put(upsert_master_items))
        .route(
            "/streamers/{profile_id}/provision-items",
            post(provision_items),
        )
        .route("/tokens/gift", post(gift))
}

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

/// Errors that can occur in Admin API handlers.
#[derive(Debug)]
pub(crate) enum AdminApiError {
    Database(sqlx::Error),
    NotFound(&'static str),
    BadRequest(String),
}

impl From<sqlx::Error> for AdminApiError {
    fn from(e: sqlx::Error) -> Self {
        AdminApiError::Database(e)
    }
}

impl From<CatalogError> for AdminApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Database(e) => AdminApiError::Database(e),
            other => AdminApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<IngestError> for AdminApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Database(e) => AdminApiError::Database(e),
            IngestError::UnknownParty { .. } => AdminApiError::NotFound("viewer or streamer not found"),
            IngestError::InvalidRewardDescriptor(_) => AdminApiError::BadRequest(format!(
                "amount must be between 1 and {}",
                itemdrop_core::ingestion::MAX_TOKENS_PER_EVENT
            )),
        }
    }
}

impl IntoResponse for AdminApiError {
    fn into_response(self) -> Response {
        match self {
            AdminApiError::Database(e) if is_unique_violation(&e) => error_response(
                StatusCode::CONFLICT,
                "a master item with this name already exists",
            ),
            AdminApiError::Database(e) => internal_error("Admin API database error", &e),
            AdminApiError::NotFound(what) => error_response(StatusCode::NOT_FOUND, what),
            AdminApiError::BadRequest(message) => error_response(StatusCode::BAD_REQUEST, message),
        }
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|e| e.is_unique_violation())
}

fn validate_master_items(items: &[MasterItemUpsert]) -> Result<(), AdminApiError> {
    for item in items {
        if item.name.trim().is_empty() {
            return Err(AdminApiError::BadRequest(format!(
                "item {} has no name",
                item.item_id
            )));
        }
        if item.default_price < 0 {
            return Err(AdminApiError::BadRequest(format!(
                "item {} has a negative price",
                item.item_id
            )));
        }
    }
    let mut ids: Vec<i32> = items.iter().map(|i| i.item_id).collect();
    ids.sort_unstable();
    if ids.windows(2).any(|w| w[0] == w[1]) {
        return Err(AdminApiError::BadRequest("duplicate itemId".to_string()));
    }
    let mut names: Vec<&str> = items.iter().map(|i| i.name.trim()).collect();
    names.sort_unstable();
    if let Some(w) = names.windows(2).find(|w| w[0] == w[1]) {
        return Err(AdminApiError::BadRequest(format!("duplicate name {}", w[0])));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    written: u64,
}

/// `PUT /master-items`
async fn upsert_master_items(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Json(items): Json<Vec<MasterItemUpsert>>,
) -> Result<Json<UpsertResponse>, AdminApiError> {
    validate_master_items(&items)?;

    let items = items
        .into_iter()
        .map(|i| MasterItem {
            item_id: i.item_id,
            name: i.name.trim().to_string(),
            enabled: i.enabled,
            default_price: i.default_price,
        })
        .collect();
    let written = state.processor().process(UpsertMasterItems { items }).await?;

    tracing::info!(written, "Master items upserted");
    Ok(Json(UpsertResponse { written }))
}

/// `POST /streamers/{profile_id}/provision-items`
async fn provision_items(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(profile_id): Path<String>,
) -> Result<Json<Vec<ItemOverride>>, AdminApiError> {
    let processor = state.processor();
    processor
        .find_streamer(&profile_id)
        .await?
        .ok_or(AdminApiError::NotFound("streamer not found"))?;

    let created = provision_default_items(&processor, &profile_id).await?;
    Ok(Json(
        created
            .into_iter()
            .map(|item| ItemOverride {
                streamer_id: item.streamer_id,
                master_item_id: item.master_item_id,
                enabled: item.enabled,
                price: item.price,
            })
            .collect(),
    ))
}

/// `POST /tokens/gift`
async fn gift(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Json(request): Json<GiftTokensRequest>,
) -> Result<Json<GiftTokensResponse>, AdminApiError> {
    let created = gift_tokens(
        &state.processor(),
        &request.streamer_id,
        &request.viewer_id,
        request.amount,
    )
    .await?;
    Ok(Json(GiftTokensResponse { created }))
}
