//! Persistence seams used by the catalog, ledger and redemption logic.
//!
//! Each trait is implemented for [`DatabaseProcessor`] by dispatching the
//! query messages in [`crate::entities`]. Tests run the same logic against
//! an in-memory store.

use crate::entities::master_items::{GetMasterItem, ListEnabledMasterItems, MasterItem};
use crate::entities::streamer_items::{
    GetStreamerItem, InsertStreamerItemsIfAbsent, ListStreamerItems, StreamerItem,
    UpdateStreamerItem,
};
use crate::entities::streamers::{
    CreateStreamer, GetStreamerByProfileId, MarkChannelPointRewardCreated,
    SetStreamerItemsEnabled, Streamer,
};
use crate::entities::tokens::{
    CountLiveOwnedTokens, CreditEventTokens, EventCredit, InsertTokens, ListLiveTokens, RedeemTokens,
    Token, TokenEventKey,
};
use crate::entities::viewers::{EnsureViewer, GetViewerByProfileId, Viewer};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use uuid::Uuid;

/// Streamers and viewers.
#[async_trait]
pub trait PartyStore: Send + Sync {
    async fn find_streamer(&self, profile_id: &str) -> Result<Option<Streamer>, sqlx::Error>;

    /// Insert a streamer or return the existing one, keeping its channel id.
    async fn create_streamer(
        &self,
        profile_id: &str,
        display_name: &str,
        channel_id: &str,
    ) -> Result<Streamer, sqlx::Error>;

    async fn set_items_enabled(
        &self,
        profile_id: &str,
        items_enabled: bool,
    ) -> Result<Option<Streamer>, sqlx::Error>;

    async fn mark_reward_created(&self, profile_id: &str) -> Result<(), sqlx::Error>;

    async fn find_viewer(&self, profile_id: &str) -> Result<Option<Viewer>, sqlx::Error>;

    async fn ensure_viewer(&self, profile_id: &str) -> Result<Viewer, sqlx::Error>;
}

/// Master items and per-streamer overrides.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn master_item(&self, item_id: i32) -> Result<Option<MasterItem>, sqlx::Error>;

    /// Globally enabled master items ordered by id.
    async fn enabled_master_items(&self) -> Result<Vec<MasterItem>, sqlx::Error>;

    async fn streamer_item(
        &self,
        streamer_id: &str,
        item_id: i32,
    ) -> Result<Option<StreamerItem>, sqlx::Error>;

    async fn streamer_items(&self, streamer_id: &str) -> Result<Vec<StreamerItem>, sqlx::Error>;

    /// Insert the rows whose `(streamer_id, master_item_id)` is not taken yet,
    /// returning only those that were created.
    async fn insert_streamer_items_if_absent(
        &self,
        items: Vec<StreamerItem>,
    ) -> Result<Vec<StreamerItem>, sqlx::Error>;

    async fn update_streamer_item(
        &self,
        streamer_id: &str,
        item_id: i32,
        enabled: bool,
        price: i32,
    ) -> Result<Option<StreamerItem>, sqlx::Error>;
}

/// The token ledger.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Count the tokens already credited for an event and insert the
    /// shortfall up to `amount`, as one step that concurrent calls for the
    /// same key cannot interleave.
    async fn credit_event(
        &self,
        key: &TokenEventKey,
        amount: u32,
    ) -> Result<EventCredit, sqlx::Error>;

    async fn insert_tokens(&self, key: &TokenEventKey, count: u32) -> Result<u64, sqlx::Error>;

    async fn live_tokens(
        &self,
        viewer_id: &str,
        streamer_id: &str,
        platform: &str,
    ) -> Result<Vec<Token>, sqlx::Error>;

    async fn count_live_owned(
        &self,
        viewer_id: &str,
        streamer_id: &str,
        token_ids: &[Uuid],
    ) -> Result<i64, sqlx::Error>;

    /// Redeem exactly `count` of `token_ids` in one conditional update.
    /// Returns `count` on success and `0` when not enough were still live.
    async fn redeem_tokens(
        &self,
        viewer_id: &str,
        streamer_id: &str,
        token_ids: &[Uuid],
        item_id: i32,
        count: i64,
    ) -> Result<u64, sqlx::Error>;
}

#[async_trait]
impl PartyStore for DatabaseProcessor {
    async fn find_streamer(&self, profile_id: &str) -> Result<Option<Streamer>, sqlx::Error> {
        self.process(GetStreamerByProfileId {
            profile_id: profile_id.to_string(),
        })
        .await
    }

    async fn create_streamer(
        &self,
        profile_id: &str,
        display_name: &str,
        channel_id: &str,
    ) -> Result<Streamer, sqlx::Error> {
        self.process(CreateStreamer {
            profile_id: profile_id.to_string(),
            display_name: display_name.to_string(),
            channel_id: channel_id.to_string(),
        })
        .await
    }

    async fn set_items_enabled(
        &self,
        profile_id: &str,
        items_enabled: bool,
    ) -> Result<Option<Streamer>, sqlx::Error> {
        self.process(SetStreamerItemsEnabled {
            profile_id: profile_id.to_string(),
            items_enabled,
        })
        .await
    }

    async fn mark_reward_created(&self, profile_id: &str) -> Result<(), sqlx::Error> {
        self.process(MarkChannelPointRewardCreated {
            profile_id: profile_id.to_string(),
        })
        .await
    }

    async fn find_viewer(&self, profile_id: &str) -> Result<Option<Viewer>, sqlx::Error> {
        self.process(GetViewerByProfileId {
            profile_id: profile_id.to_string(),
        })
        .await
    }

    async fn ensure_viewer(&self, profile_id: &str) -> Result<Viewer, sqlx::Error> {
        self.process(EnsureViewer {
            profile_id: profile_id.to_string(),
        })
        .await
    }
}

#[async_trait]
impl CatalogStore for DatabaseProcessor {
    async fn master_item(&self, item_id: i32) -> Result<Option<MasterItem>, sqlx::Error> {
        self.process(GetMasterItem { item_id }).await
    }

    async fn enabled_master_items(&self) -> Result<Vec<MasterItem>, sqlx::Error> {
        self.process(ListEnabledMasterItems).await
    }

    async fn streamer_item(
        &self,
        streamer_id: &str,
        item_id: i32,
    ) -> Result<Option<StreamerItem>, sqlx::Error> {
        self.process(GetStreamerItem {
            streamer_id: streamer_id.to_string(),
            master_item_id: item_id,
        })
        .await
    }

    async fn streamer_items(&self, streamer_id: &str) -> Result<Vec<StreamerItem>, sqlx::Error> {
        self.process(ListStreamerItems {
            streamer_id: streamer_id.to_string(),
        })
        .await
    }

    async fn insert_streamer_items_if_absent(
        &self,
        items: Vec<StreamerItem>,
    ) -> Result<Vec<StreamerItem>, sqlx::Error> {
        self.process(InsertStreamerItemsIfAbsent { items }).await
    }

    async fn update_streamer_item(
        &self,
        streamer_id: &str,
        item_id: i32,
        enabled: bool,
        price: i32,
    ) -> Result<Option<StreamerItem>, sqlx::Error> {
        self.process(UpdateStreamerItem {
            streamer_id: streamer_id.to_string(),
            master_item_id: item_id,
            enabled,
            price,
        })
        .await
    }
}

#[async_trait]
impl TokenStore for DatabaseProcessor {
    async fn credit_event(
        &self,
        key: &TokenEventKey,
        amount: u32,
    ) -> Result<EventCredit, sqlx::Error> {
        self.process(CreditEventTokens {
            key: key.clone(),
            amount,
        })
        .await
    }

    async fn insert_tokens(&self, key: &TokenEventKey, count: u32) -> Result<u64, sqlx::Error> {
        self.process(InsertTokens {
            key: key.clone(),
            count,
        })
        .await
    }

    async fn live_tokens(
        &self,
        viewer_id: &str,
        streamer_id: &str,
        platform: &str,
    ) -> Result<Vec<Token>, sqlx::Error> {
        self.process(ListLiveTokens {
            viewer_id: viewer_id.to_string(),
            streamer_id: streamer_id.to_string(),
            platform: platform.to_string(),
        })
        .await
    }

    async fn count_live_owned(
        &self,
        viewer_id: &str,
        streamer_id: &str,
        token_ids: &[Uuid],
    ) -> Result<i64, sqlx::Error> {
        self.process(CountLiveOwnedTokens {
            viewer_id: viewer_id.to_string(),
            streamer_id: streamer_id.to_string(),
            token_ids: token_ids.to_vec(),
        })
        .await
    }

    async fn redeem_tokens(
        &self,
        viewer_id: &str,
        streamer_id: &str,
        token_ids: &[Uuid],
        item_id: i32,
        count: i64,
    ) -> Result<u64, sqlx::Error> {
        self.process(RedeemTokens {
            viewer_id: viewer_id.to_string(),
            streamer_id: streamer_id.to_string(),
            token_ids: token_ids.to_vec(),
            item_id,
            count,
        })
        .await
    }
}
