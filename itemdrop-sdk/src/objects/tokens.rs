//! Token ledger DTOs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a token came from.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `itemdrop-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    ChannelPoints,
    Bits,
    Gifted,
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::ChannelPoints => write!(f, "channel_points"),
            TokenSource::Bits => write!(f, "bits"),
            TokenSource::Gifted => write!(f, "gifted"),
        }
    }
}

/// A live token as returned by `GET /tokens`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenView {
    pub id: Uuid,
    pub viewer_id: String,
    pub streamer_id: String,
    pub platform: String,
    pub source: TokenSource,
    pub source_event_id: String,
    pub created_at: i64,
}

/// Query string carrying the streamer a viewer is watching.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamerQuery {
    pub streamer_id: Option<String>,
}

/// Body of `POST /redeem`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub streamer_id: String,
    pub item_id: i32,
    #[serde(default)]
    pub token_ids: Vec<Uuid>,
    #[serde(default)]
    pub x_coord: f64,
}

/// Body of `POST /admin/tokens/gift`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftTokensRequest {
    pub streamer_id: String,
    pub viewer_id: String,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftTokensResponse {
    pub created: u64,
}

/// Error body returned by the viewer and streamer APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redeem_request_defaults() {
        let req: RedeemRequest =
            serde_json::from_str(r#"{"streamerId":"1234","itemId":5}"#).unwrap();
        assert_eq!(req.streamer_id, "1234");
        assert_eq!(req.item_id, 5);
        assert!(req.token_ids.is_empty());
        assert_eq!(req.x_coord, 0.0);
    }

    #[test]
    fn test_source_display_matches_serde() {
        for source in [TokenSource::ChannelPoints, TokenSource::Bits, TokenSource::Gifted] {
            let json = serde_json::to_string(&source).unwrap();
            assert_eq!(json, format!("\"{source}\""));
        }
    }
}
