//! EventSub webhook payloads.
//!
//! Only the fields the backend reads are modelled; everything else in the
//! delivery is ignored.

use serde::{Deserialize, Serialize};

pub const MESSAGE_TYPE_NOTIFICATION: &str = "notification";
pub const MESSAGE_TYPE_VERIFICATION: &str = "webhook_callback_verification";
pub const MESSAGE_TYPE_REVOCATION: &str = "revocation";

/// Subscription type for channel-point reward redemptions.
pub const CHANNEL_POINTS_REDEMPTION_ADD: &str =
    "channel.channel_points_custom_reward_redemption.add";

/// Subscription type for extension bits purchases.
pub const BITS_TRANSACTION_CREATE: &str = "extension.bits_transaction.create";

/// The envelope of every EventSub webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSubMessage {
    pub subscription: Subscription,
    #[serde(default)]
    pub event: Option<serde_json::Value>,
    #[serde(default)]
    pub challenge: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// `channel.channel_points_custom_reward_redemption.add` event body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelPointsRedemption {
    pub id: String,
    pub broadcaster_user_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    pub reward: Reward,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub cost: i64,
}

/// `extension.bits_transaction.create` event body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitsTransaction {
    pub id: String,
    pub broadcaster_user_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    pub product: Product,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub name: String,
    pub sku: String,
    #[serde(default)]
    pub bits: i64,
}
