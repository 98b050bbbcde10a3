//! Item catalog DTOs.

use serde::{Deserialize, Serialize};

/// A master item as seen by one streamer's viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveItem {
    pub item_id: i32,
    pub name: String,
    pub price: i32,
    pub enabled: bool,
}

/// Admin upsert of a master item, keyed by `item_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterItemUpsert {
    pub item_id: i32,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub default_price: i32,
}

fn default_true() -> bool {
    true
}

/// Body of `PUT /streamer/items/{itemId}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemOverrideRequest {
    pub enabled: bool,
    pub price: i32,
}

/// A streamer's override row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOverride {
    pub streamer_id: String,
    pub master_item_id: i32,
    pub enabled: bool,
    pub price: i32,
}
