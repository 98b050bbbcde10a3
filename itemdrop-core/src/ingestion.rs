//! Crediting the token ledger from external events.
//!
//! Deliveries are at-least-once, so every credit is keyed by the external
//! event id and only the shortfall between what the event is worth and what
//! was already credited for it gets inserted.

use crate::entities::TokenSource;
use crate::entities::tokens::{PLATFORM_TWITCH, TokenEventKey};
use crate::store::{PartyStore, TokenStore};
use itemdrop_sdk::objects::eventsub::{BitsTransaction, ChannelPointsRedemption};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

/// Upper bound on tokens a single event may credit.
pub const MAX_TOKENS_PER_EVENT: u32 = 10_000;

/// Source event id used for manually gifted tokens.
pub const GIFTED_SOURCE_EVENT_ID: &str = "manual-gifted-tokens";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid reward descriptor: {0}")]
    InvalidRewardDescriptor(String),

    #[error("unknown party (viewer {viewer_id}, streamer {streamer_id})")]
    UnknownParty {
        viewer_id: String,
        streamer_id: String,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Extracts token amounts from reward titles and product SKUs.
#[derive(Debug, Clone)]
pub struct RewardParser {
    title: Regex,
    sku: Regex,
}

impl RewardParser {
    /// Build a parser for titles like `"100 <unit_name>s"`.
    pub fn new(unit_name: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            title: Regex::new(&format!(r"^(\d+) {}s?", regex::escape(unit_name)))?,
            sku: Regex::new(r"(\d+)_tokens")?,
        })
    }

    pub fn amount_from_title(&self, title: &str) -> Result<u32, IngestError> {
        Self::amount_from(&self.title, title)
    }

    pub fn amount_from_sku(&self, sku: &str) -> Result<u32, IngestError> {
        Self::amount_from(&self.sku, sku)
    }

    fn amount_from(pattern: &Regex, descriptor: &str) -> Result<u32, IngestError> {
        let invalid = || IngestError::InvalidRewardDescriptor(descriptor.to_string());
        let amount: u32 = pattern
            .captures(descriptor)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(invalid)?;
        if amount == 0 || amount > MAX_TOKENS_PER_EVENT {
            return Err(invalid());
        }
        Ok(amount)
    }
}

/// A normalized credit derived from one external event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditRequest {
    pub viewer_id: String,
    pub streamer_id: String,
    pub source: TokenSource,
    pub source_event_id: String,
    pub amount: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Credited { created: u64 },
    /// The event was already fully credited; nothing was written.
    AlreadyCredited { existing: i64 },
}

impl CreditRequest {
    pub fn from_channel_points(
        parser: &RewardParser,
        event: &ChannelPointsRedemption,
    ) -> Result<Self, IngestError> {
        Ok(Self {
            viewer_id: event.user_id.clone(),
            streamer_id: event.broadcaster_user_id.clone(),
            source: TokenSource::ChannelPoints,
            source_event_id: event.id.clone(),
            amount: parser.amount_from_title(&event.reward.title)?,
        })
    }

    pub fn from_bits(parser: &RewardParser, event: &BitsTransaction) -> Result<Self, IngestError> {
        Ok(Self {
            viewer_id: event.user_id.clone(),
            streamer_id: event.broadcaster_user_id.clone(),
            source: TokenSource::Bits,
            source_event_id: event.id.clone(),
            amount: parser.amount_from_sku(&event.product.sku)?,
        })
    }

    fn key(&self) -> TokenEventKey {
        TokenEventKey {
            viewer_id: self.viewer_id.clone(),
            streamer_id: self.streamer_id.clone(),
            platform: PLATFORM_TWITCH.to_string(),
            source: self.source,
            source_event_id: self.source_event_id.clone(),
        }
    }
}

async fn require_parties<S>(store: &S, viewer_id: &str, streamer_id: &str) -> Result<(), IngestError>
where
    S: PartyStore + ?Sized,
{
    let streamer = store.find_streamer(streamer_id).await?;
    let viewer = store.find_viewer(viewer_id).await?;
    if streamer.is_none() || viewer.is_none() {
        return Err(IngestError::UnknownParty {
            viewer_id: viewer_id.to_string(),
            streamer_id: streamer_id.to_string(),
        });
    }
    Ok(())
}

/// Credit the tokens an event is worth, minus what was already credited for it.
#[tracing::instrument(
    skip_all,
    fields(source = %request.source, source_event_id = %request.source_event_id)
)]
pub async fn credit_tokens<S>(store: &S, request: &CreditRequest) -> Result<CreditOutcome, IngestError>
where
    S: PartyStore + TokenStore + ?Sized,
{
    require_parties(store, &request.viewer_id, &request.streamer_id).await?;

    let key = request.key();
    let credit = store.credit_event(&key, request.amount).await?;
    if credit.created == 0 {
        debug!(existing = credit.existing, wanted = request.amount, "Event already credited");
        return Ok(CreditOutcome::AlreadyCredited {
            existing: credit.existing,
        });
    }

    let created = credit.created;
    info!(
        viewer_id = %request.viewer_id,
        streamer_id = %request.streamer_id,
        created,
        "Tokens credited"
    );
    Ok(CreditOutcome::Credited { created })
}

/// Insert `amount` gifted tokens. Gifts are not deduplicated.
pub async fn gift_tokens<S>(
    store: &S,
    streamer_id: &str,
    viewer_id: &str,
    amount: u32,
) -> Result<u64, IngestError>
where
    S: PartyStore + TokenStore + ?Sized,
{
    if amount == 0 || amount > MAX_TOKENS_PER_EVENT {
        return Err(IngestError::InvalidRewardDescriptor(format!(
            "gift amount {amount}"
        )));
    }
    require_parties(store, viewer_id, streamer_id).await?;

    let key = TokenEventKey {
        viewer_id: viewer_id.to_string(),
        streamer_id: streamer_id.to_string(),
        platform: PLATFORM_TWITCH.to_string(),
        source: TokenSource::Gifted,
        source_event_id: GIFTED_SOURCE_EVENT_ID.to_string(),
    };
    let created = store.insert_tokens(&key, amount).await?;
    info!(%viewer_id, %streamer_id, created, "Tokens gifted");
    Ok(created)
}
