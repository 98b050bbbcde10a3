use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Viewer {
    pub twitch_profile_id: String,
    pub display_name: Option<String>,
    pub created_at: time::PrimitiveDateTime,
}

impl Viewer {
    /// Name shown to the streamer; falls back to the profile id.
    pub fn display_name_or_id(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.twitch_profile_id)
    }
}

#[derive(Debug, Clone)]
pub struct GetViewerByProfileId {
    pub profile_id: String,
}

impl Processor<GetViewerByProfileId> for DatabaseProcessor {
    type Output = Option<Viewer>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetViewerByProfileId")]
    async fn process(&self, query: GetViewerByProfileId) -> Result<Option<Viewer>, sqlx::Error> {
        sqlx::query_as::<_, Viewer>(
            r#"
            SELECT twitch_profile_id, display_name, created_at
            FROM viewers
            WHERE twitch_profile_id = $1
            "#,
        )
        .bind(query.profile_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Fetch a viewer, creating the row on first sight.
pub struct EnsureViewer {
    pub profile_id: String,
}

impl Processor<EnsureViewer> for DatabaseProcessor {
    type Output = Viewer;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:EnsureViewer")]
    async fn process(&self, query: EnsureViewer) -> Result<Viewer, sqlx::Error> {
        // The no-op update makes RETURNING yield the existing row too.
        sqlx::query_as::<_, Viewer>(
            r#"
            INSERT INTO viewers (twitch_profile_id)
            VALUES ($1)
            ON CONFLICT (twitch_profile_id)
            DO UPDATE SET twitch_profile_id = EXCLUDED.twitch_profile_id
            RETURNING twitch_profile_id, display_name, created_at
            "#,
        )
        .bind(query.profile_id)
        .fetch_one(&self.pool)
        .await
    }
}
