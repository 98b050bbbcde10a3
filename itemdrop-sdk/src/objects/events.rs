//! Messages pushed to the companion application over the event stream.

use serde::{Deserialize, Serialize};

/// Body of the first message sent after the stream opens.
pub const CONNECTED_MESSAGE: &str = "Connected to event stream";

/// Events delivered to a channel's consumer.
///
/// Serialized as `{"type": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    SpawnItem(SpawnItem),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnItem {
    pub item_id: i32,
    pub item_name: String,
    pub viewer_display_name: String,
    pub coords: Coords,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub x: f64,
}

/// Greeting written when a consumer connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedMessage {
    pub message: String,
}

impl Default for ConnectedMessage {
    fn default() -> Self {
        Self {
            message: CONNECTED_MESSAGE.to_string(),
        }
    }
}
