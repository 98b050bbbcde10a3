use crate::entities::TokenSource;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use uuid::Uuid;

/// The only platform tokens are earned on today.
pub const PLATFORM_TWITCH: &str = "twitch";

/// One unit of spendable currency.
///
/// A token is live while `redeemed_at` is `None`. Redemption sets both
/// `redeemed_at` and `redeemed_for` and is never undone.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Token {
    pub id: Uuid,
    pub viewer_id: String,
    pub streamer_id: String,
    pub platform: String,
    pub source: TokenSource,
    pub source_event_id: String,
    pub created_at: time::PrimitiveDateTime,
    pub redeemed_at: Option<time::PrimitiveDateTime>,
    pub redeemed_for: Option<i32>,
}

/// Identifies the tokens credited for a single external event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenEventKey {
    pub viewer_id: String,
    pub streamer_id: String,
    pub platform: String,
    pub source: TokenSource,
    pub source_event_id: String,
}

const TOKEN_COLUMNS: &str = "id, viewer_id, streamer_id, platform, source, source_event_id, \
     created_at, redeemed_at, redeemed_for";

impl TokenEventKey {
    /// Key for the per-event advisory lock.
    fn lock_key(&self) -> String {
        format!(
            "tokens:{}:{}:{}:{}:{}",
            self.platform, self.streamer_id, self.viewer_id, self.source, self.source_event_id
        )
    }

    /// Count every token (live or redeemed) credited for this event, within a transaction.
    pub async fn count_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM tokens
            WHERE viewer_id = $1 AND streamer_id = $2 AND platform = $3
              AND source = $4 AND source_event_id = $5
            "#,
        )
        .bind(&self.viewer_id)
        .bind(&self.streamer_id)
        .bind(&self.platform)
        .bind(self.source)
        .bind(&self.source_event_id)
        .fetch_one(&mut **tx)
        .await
    }
}

fn insert_tokens_query(key: &TokenEventKey, count: u32) -> sqlx::QueryBuilder<'static, sqlx::Postgres> {
    let mut query_builder = sqlx::QueryBuilder::new(
        "INSERT INTO tokens (id, viewer_id, streamer_id, platform, source, source_event_id) ",
    );
    query_builder.push_values(0..count, |mut b, _| {
        b.push_bind(Uuid::now_v7())
            .push_bind(key.viewer_id.clone())
            .push_bind(key.streamer_id.clone())
            .push_bind(key.platform.clone())
            .push_bind(key.source)
            .push_bind(key.source_event_id.clone());
    });
    query_builder
}

/// What one event credit found and wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventCredit {
    pub existing: i64,
    pub created: u64,
}

#[derive(Debug, Clone)]
/// Bring the tokens credited for one event up to `amount`.
///
/// Count and insert run in one transaction holding an advisory lock on the
/// event key, so concurrent redeliveries of the same event are serialized.
pub struct CreditEventTokens {
    pub key: TokenEventKey,
    pub amount: u32,
}

impl Processor<CreditEventTokens> for DatabaseProcessor {
    type Output = EventCredit;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CreditEventTokens")]
    async fn process(&self, credit: CreditEventTokens) -> Result<EventCredit, sqlx::Error> {
        let key = credit.key;
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key.lock_key())
            .execute(&mut *tx)
            .await?;

        let existing = key.count_tx(&mut tx).await?;
        let shortfall = u32::try_from(i64::from(credit.amount) - existing).unwrap_or(0);
        let created = if shortfall > 0 {
            insert_tokens_query(&key, shortfall)
                .build()
                .execute(&mut *tx)
                .await?
                .rows_affected()
        } else {
            0
        };

        tx.commit().await?;
        Ok(EventCredit { existing, created })
    }
}

#[derive(Debug, Clone)]
/// Insert `count` new live tokens for an event in a single query.
///
/// Returns the number of rows inserted.
pub struct InsertTokens {
    pub key: TokenEventKey,
    pub count: u32,
}

impl Processor<InsertTokens> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertTokens")]
    async fn process(&self, insert: InsertTokens) -> Result<u64, sqlx::Error> {
        if insert.count == 0 {
            return Ok(0);
        }
        let result = insert_tokens_query(&insert.key, insert.count)
            .build()
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
/// A viewer's live tokens for one streamer, oldest first.
pub struct ListLiveTokens {
    pub viewer_id: String,
    pub streamer_id: String,
    pub platform: String,
}

impl Processor<ListLiveTokens> for DatabaseProcessor {
    type Output = Vec<Token>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListLiveTokens")]
    async fn process(&self, query: ListLiveTokens) -> Result<Vec<Token>, sqlx::Error> {
        sqlx::query_as::<_, Token>(&format!(
            r#"
            SELECT {TOKEN_COLUMNS} FROM tokens
            WHERE viewer_id = $1 AND streamer_id = $2 AND platform = $3
              AND redeemed_at IS NULL
            ORDER BY created_at, id
            "#
        ))
        .bind(query.viewer_id)
        .bind(query.streamer_id)
        .bind(query.platform)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// How many of the given ids are live tokens owned by the viewer for this streamer.
pub struct CountLiveOwnedTokens {
    pub viewer_id: String,
    pub streamer_id: String,
    pub token_ids: Vec<Uuid>,
}

impl Processor<CountLiveOwnedTokens> for DatabaseProcessor {
    type Output = i64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CountLiveOwnedTokens")]
    async fn process(&self, query: CountLiveOwnedTokens) -> Result<i64, sqlx::Error> {
        if query.token_ids.is_empty() {
            return Ok(0);
        }
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM tokens
            WHERE id = ANY($1) AND viewer_id = $2 AND streamer_id = $3
              AND redeemed_at IS NULL
            "#,
        )
        .bind(query.token_ids)
        .bind(query.viewer_id)
        .bind(query.streamer_id)
        .fetch_one(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Redeem exactly `count` of the given tokens for an item, or none at all.
///
/// The candidate rows are locked and re-checked for `redeemed_at IS NULL`
/// inside the same statement, so two concurrent redemptions can never both
/// flip the same token. Returns the number of tokens redeemed, which is
/// either `count` or `0`.
pub struct RedeemTokens {
    pub viewer_id: String,
    pub streamer_id: String,
    pub token_ids: Vec<Uuid>,
    pub item_id: i32,
    pub count: i64,
}

impl Processor<RedeemTokens> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:RedeemTokens")]
    async fn process(&self, redeem: RedeemTokens) -> Result<u64, sqlx::Error> {
        if redeem.count <= 0 || redeem.token_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            r#"
            WITH candidates AS (
                SELECT id FROM tokens
                WHERE id = ANY($1) AND viewer_id = $2 AND streamer_id = $3
                  AND redeemed_at IS NULL
                ORDER BY created_at, id
                LIMIT $4
                FOR UPDATE
            )
            UPDATE tokens
            SET redeemed_at = NOW(), redeemed_for = $5
            WHERE id IN (SELECT id FROM candidates)
              AND redeemed_at IS NULL
              AND (SELECT COUNT(*) FROM candidates) = $4
            "#,
        )
        .bind(redeem.token_ids)
        .bind(redeem.viewer_id)
        .bind(redeem.streamer_id)
        .bind(redeem.count)
        .bind(redeem.item_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
