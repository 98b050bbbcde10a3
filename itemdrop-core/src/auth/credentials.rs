use crate::entities::bot_credentials::{
    DeleteBotRefreshToken, GetBotRefreshToken, UpsertBotRefreshToken,
};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;

/// Durable storage for the bot's refresh token, keyed by identity.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, identity: &str) -> Result<Option<String>, sqlx::Error>;

    async fn save(&self, identity: &str, refresh_token: &str) -> Result<(), sqlx::Error>;

    async fn delete(&self, identity: &str) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl CredentialStore for DatabaseProcessor {
    async fn load(&self, identity: &str) -> Result<Option<String>, sqlx::Error> {
        self.process(GetBotRefreshToken {
            identity: identity.to_string(),
        })
        .await
    }

    async fn save(&self, identity: &str, refresh_token: &str) -> Result<(), sqlx::Error> {
        self.process(UpsertBotRefreshToken {
            identity: identity.to_string(),
            refresh_token: refresh_token.to_string(),
        })
        .await
    }

    async fn delete(&self, identity: &str) -> Result<(), sqlx::Error> {
        self.process(DeleteBotRefreshToken {
            identity: identity.to_string(),
        })
        .await
        .map(|_| ())
    }
}
