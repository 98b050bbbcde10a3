pub mod eventsub;
pub mod events;
pub mod items;
pub mod streamer;
pub mod tokens;

pub use events::{Coords, ConnectedMessage, SpawnItem, StreamEvent};
pub use items::{EffectiveItem, ItemOverride, MasterItemUpsert, UpdateItemOverrideRequest};
pub use streamer::{BotState, BotStatus, ItemsEnabledRequest, StreamerProfile};
pub use tokens::{
    ApiError, GiftTokensRequest, GiftTokensResponse, RedeemRequest, StreamerQuery, TokenSource,
    TokenView,
};
