//! Streamer sign-up on first sign-in.

use crate::catalog::{CatalogError, provision_default_items};
use crate::entities::streamers::Streamer;
use crate::store::{CatalogStore, PartyStore};
use rand::Rng;
use tracing::info;

/// A fresh 32-byte random channel id, hex encoded.
pub fn generate_channel_id() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// The signed-in streamer, and whether this sign-in created them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInStreamer {
    pub streamer: Streamer,
    pub created: bool,
}

/// Look up a streamer by Twitch profile id, creating them with default
/// items on first sign-in.
pub async fn find_or_create_streamer<S>(
    store: &S,
    profile_id: &str,
    display_name: &str,
) -> Result<SignedInStreamer, CatalogError>
where
    S: PartyStore + CatalogStore + ?Sized,
{
    if let Some(streamer) = store.find_streamer(profile_id).await? {
        return Ok(SignedInStreamer {
            streamer,
            created: false,
        });
    }

    let streamer = store
        .create_streamer(profile_id, display_name, &generate_channel_id())
        .await?;
    provision_default_items(store, &streamer.twitch_profile_id).await?;
    info!(%profile_id, "New streamer signed up");

    Ok(SignedInStreamer {
        streamer,
        created: true,
    })
}
