use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Streamer {
    pub twitch_profile_id: String,
    pub display_name: String,
    pub items_enabled: bool,
    /// Opaque rendezvous key for the event stream. Never changes once created.
    pub channel_id: String,
    pub channel_point_reward_created: bool,
    pub created_at: time::PrimitiveDateTime,
}

const STREAMER_COLUMNS: &str = "twitch_profile_id, display_name, items_enabled, channel_id, \
     channel_point_reward_created, created_at";

#[derive(Debug, Clone)]
pub struct GetStreamerByProfileId {
    pub profile_id: String,
}

impl Processor<GetStreamerByProfileId> for DatabaseProcessor {
    type Output = Option<Streamer>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetStreamerByProfileId")]
    async fn process(&self, query: GetStreamerByProfileId) -> Result<Option<Streamer>, sqlx::Error> {
        sqlx::query_as::<_, Streamer>(&format!(
            "SELECT {STREAMER_COLUMNS} FROM streamers WHERE twitch_profile_id = $1"
        ))
        .bind(query.profile_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Insert a streamer, or return the existing row when the profile id is taken.
///
/// An existing row keeps its `channel_id`; only the display name is refreshed.
pub struct CreateStreamer {
    pub profile_id: String,
    pub display_name: String,
    pub channel_id: String,
}

impl Processor<CreateStreamer> for DatabaseProcessor {
    type Output = Streamer;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CreateStreamer")]
    async fn process(&self, query: CreateStreamer) -> Result<Streamer, sqlx::Error> {
        sqlx::query_as::<_, Streamer>(&format!(
            r#"
            INSERT INTO streamers (twitch_profile_id, display_name, channel_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (twitch_profile_id)
            DO UPDATE SET display_name = EXCLUDED.display_name
            RETURNING {STREAMER_COLUMNS}
            "#
        ))
        .bind(query.profile_id)
        .bind(query.display_name)
        .bind(query.channel_id)
        .fetch_one(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct SetStreamerItemsEnabled {
    pub profile_id: String,
    pub items_enabled: bool,
}

impl Processor<SetStreamerItemsEnabled> for DatabaseProcessor {
    type Output = Option<Streamer>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:SetStreamerItemsEnabled")]
    async fn process(&self, query: SetStreamerItemsEnabled) -> Result<Option<Streamer>, sqlx::Error> {
        sqlx::query_as::<_, Streamer>(&format!(
            r#"
            UPDATE streamers SET items_enabled = $2
            WHERE twitch_profile_id = $1
            RETURNING {STREAMER_COLUMNS}
            "#
        ))
        .bind(query.profile_id)
        .bind(query.items_enabled)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct MarkChannelPointRewardCreated {
    pub profile_id: String,
}

impl Processor<MarkChannelPointRewardCreated> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:MarkChannelPointRewardCreated")]
    async fn process(&self, query: MarkChannelPointRewardCreated) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE streamers SET channel_point_reward_created = TRUE WHERE twitch_profile_id = $1",
        )
        .bind(query.profile_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
