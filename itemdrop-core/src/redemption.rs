//! Spending tokens to spawn an item on the streamer's game.
//!
//! Validation runs in a fixed order so callers always see the same reason
//! for a rejected request:
//!
//! 1. the streamer exists,
//! 2. the streamer's game is connected,
//! 3. the streamer has the item switched on,
//! 4. the master item still exists and is globally enabled,
//! 5. the streamer has items turned on,
//! 6. the viewer holds enough of the offered tokens.
//!
//! Only then are tokens spent, in one conditional update, followed by the
//! `spawn_item` broadcast.

use crate::entities::viewers::Viewer;
use crate::fanout::{FanoutError, FanoutRegistry};
use crate::store::{CatalogStore, PartyStore, TokenStore};
use itemdrop_sdk::objects::{Coords, RedeemRequest, SpawnItem, StreamEvent};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RedeemError {
    #[error("streamer {0} not found")]
    StreamerNotFound(String),

    #[error("the streamer's game is not connected")]
    ConsumerNotConnected,

    #[error("item {0} not found")]
    ItemNotFound(i32),

    #[error("items are disabled for this streamer")]
    ItemsDisabled,

    #[error(
        "You need {price} tokens to spawn {item_name}, but only {available} of the offered tokens \
         are available ({missing} missing)",
        missing = .price - .available
    )]
    InsufficientTokens {
        item_name: String,
        price: i64,
        available: i64,
    },

    /// Tokens were spent but the event could not be handed to the game.
    #[error("spawn event could not be delivered: {0}")]
    Delivery(#[source] FanoutError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Executes redemptions against a store and the live event registry.
pub struct RedemptionEngine<'a, S: ?Sized> {
    store: &'a S,
    fanout: &'a FanoutRegistry,
}

impl<'a, S> RedemptionEngine<'a, S>
where
    S: PartyStore + CatalogStore + TokenStore + ?Sized,
{
    pub fn new(store: &'a S, fanout: &'a FanoutRegistry) -> Self {
        Self { store, fanout }
    }

    /// Spend the item's price in tokens from `request.token_ids` and spawn it.
    #[tracing::instrument(
        skip_all,
        fields(viewer_id = %viewer.twitch_profile_id, streamer_id = %request.streamer_id, item_id = request.item_id)
    )]
    pub async fn redeem(&self, viewer: &Viewer, request: &RedeemRequest) -> Result<(), RedeemError> {
        let streamer = self
            .store
            .find_streamer(&request.streamer_id)
            .await?
            .ok_or_else(|| RedeemError::StreamerNotFound(request.streamer_id.clone()))?;

        if !self.fanout.has_consumer(&streamer.channel_id) {
            return Err(RedeemError::ConsumerNotConnected);
        }

        let streamer_item = self
            .store
            .streamer_item(&streamer.twitch_profile_id, request.item_id)
            .await?
            .filter(|item| item.enabled)
            .ok_or(RedeemError::ItemNotFound(request.item_id))?;

        let master_item = self
            .store
            .master_item(request.item_id)
            .await?
            .filter(|item| item.enabled)
            .ok_or(RedeemError::ItemNotFound(request.item_id))?;

        if !streamer.items_enabled {
            return Err(RedeemError::ItemsDisabled);
        }

        let mut token_ids: Vec<Uuid> = request.token_ids.clone();
        token_ids.sort_unstable();
        token_ids.dedup();

        let price = i64::from(streamer_item.price);
        let available = self
            .store
            .count_live_owned(&viewer.twitch_profile_id, &streamer.twitch_profile_id, &token_ids)
            .await?;
        if available < price {
            return Err(RedeemError::InsufficientTokens {
                item_name: master_item.name,
                price,
                available,
            });
        }

        if price > 0 {
            let redeemed = self
                .store
                .redeem_tokens(
                    &viewer.twitch_profile_id,
                    &streamer.twitch_profile_id,
                    &token_ids,
                    master_item.item_id,
                    price,
                )
                .await?;
            if i64::try_from(redeemed).unwrap_or(i64::MAX) != price {
                // A concurrent redemption spent some of these tokens first.
                let available = self
                    .store
                    .count_live_owned(&viewer.twitch_profile_id, &streamer.twitch_profile_id, &token_ids)
                    .await?;
                warn!(price, available, "Lost a race for the offered tokens");
                return Err(RedeemError::InsufficientTokens {
                    item_name: master_item.name,
                    price,
                    available: available.min(price),
                });
            }
        }

        let event = StreamEvent::SpawnItem(SpawnItem {
            item_id: master_item.item_id,
            item_name: master_item.name.clone(),
            viewer_display_name: viewer.display_name_or_id().to_string(),
            coords: Coords { x: request.x_coord },
        });

        if let Err(e) = self.fanout.broadcast(&streamer.channel_id, &event) {
            error!(
                error = %e,
                channel_id = %streamer.channel_id,
                price,
                "Tokens spent but spawn event was not delivered"
            );
            return Err(RedeemError::Delivery(e));
        }

        info!(item_name = %master_item.name, price, "Item redeemed");
        Ok(())
    }
}
