//! Streamer settings and bot status DTOs.

use serde::{Deserialize, Serialize};

/// Body of `PUT /streamer/items-enabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsEnabledRequest {
    pub items_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamerProfile {
    pub twitch_profile_id: String,
    pub display_name: String,
    pub items_enabled: bool,
    pub channel_point_reward_created: bool,
}

/// Position of the bot credential state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotState {
    Uninitialized,
    Active,
    Refreshing,
    NeedsReauth,
}

impl std::fmt::Display for BotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotState::Uninitialized => write!(f, "uninitialized"),
            BotState::Active => write!(f, "active"),
            BotState::Refreshing => write!(f, "refreshing"),
            BotState::NeedsReauth => write!(f, "needs_reauth"),
        }
    }
}

/// Response of `GET /bot/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotStatus {
    pub state: BotState,
    pub authorized: bool,
}
