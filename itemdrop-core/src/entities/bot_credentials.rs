use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

/// The stored refresh token of the bot identity. At most one row per identity.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct BotCredential {
    pub identity: String,
    pub refresh_token: String,
    pub updated_at: time::PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub struct GetBotRefreshToken {
    pub identity: String,
}

impl Processor<GetBotRefreshToken> for DatabaseProcessor {
    type Output = Option<String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetBotRefreshToken")]
    async fn process(&self, query: GetBotRefreshToken) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query_as::<_, BotCredential>(
            r#"
            SELECT identity, refresh_token, updated_at
            FROM bot_credentials
            WHERE identity = $1
            "#,
        )
        .bind(query.identity)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.refresh_token))
    }
}

#[derive(Debug, Clone)]
/// Insert or replace the refresh token for an identity.
pub struct UpsertBotRefreshToken {
    pub identity: String,
    pub refresh_token: String,
}

impl Processor<UpsertBotRefreshToken> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertBotRefreshToken")]
    async fn process(&self, query: UpsertBotRefreshToken) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO bot_credentials (identity, refresh_token, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (identity)
            DO UPDATE SET refresh_token = EXCLUDED.refresh_token, updated_at = NOW()
            "#,
        )
        .bind(query.identity)
        .bind(query.refresh_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DeleteBotRefreshToken {
    pub identity: String,
}

impl Processor<DeleteBotRefreshToken> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteBotRefreshToken")]
    async fn process(&self, query: DeleteBotRefreshToken) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM bot_credentials WHERE identity = $1")
            .bind(query.identity)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
