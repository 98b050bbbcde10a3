use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

/// A streamer's override of one master item.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StreamerItem {
    pub streamer_id: String,
    pub master_item_id: i32,
    pub enabled: bool,
    pub price: i32,
}

#[derive(Debug, Clone)]
pub struct GetStreamerItem {
    pub streamer_id: String,
    pub master_item_id: i32,
}

impl Processor<GetStreamerItem> for DatabaseProcessor {
    type Output = Option<StreamerItem>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetStreamerItem")]
    async fn process(&self, query: GetStreamerItem) -> Result<Option<StreamerItem>, sqlx::Error> {
        sqlx::query_as::<_, StreamerItem>(
            r#"
            SELECT streamer_id, master_item_id, enabled, price
            FROM streamer_items
            WHERE streamer_id = $1 AND master_item_id = $2
            "#,
        )
        .bind(query.streamer_id)
        .bind(query.master_item_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct ListStreamerItems {
    pub streamer_id: String,
}

impl Processor<ListStreamerItems> for DatabaseProcessor {
    type Output = Vec<StreamerItem>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListStreamerItems")]
    async fn process(&self, query: ListStreamerItems) -> Result<Vec<StreamerItem>, sqlx::Error> {
        sqlx::query_as::<_, StreamerItem>(
            r#"
            SELECT streamer_id, master_item_id, enabled, price
            FROM streamer_items
            WHERE streamer_id = $1
            ORDER BY master_item_id
            "#,
        )
        .bind(query.streamer_id)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Insert override rows, skipping items the streamer already has.
///
/// Uses QueryBuilder for a single bulk insert with ON CONFLICT DO NOTHING.
/// Returns only the rows that were actually created.
pub struct InsertStreamerItemsIfAbsent {
    pub items: Vec<StreamerItem>,
}

impl Processor<InsertStreamerItemsIfAbsent> for DatabaseProcessor {
    type Output = Vec<StreamerItem>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertStreamerItemsIfAbsent")]
    async fn process(
        &self,
        insert: InsertStreamerItemsIfAbsent,
    ) -> Result<Vec<StreamerItem>, sqlx::Error> {
        if insert.items.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder = sqlx::QueryBuilder::new(
            "INSERT INTO streamer_items (streamer_id, master_item_id, enabled, price) ",
        );

        query_builder.push_values(insert.items, |mut b, item| {
            b.push_bind(item.streamer_id)
                .push_bind(item.master_item_id)
                .push_bind(item.enabled)
                .push_bind(item.price);
        });

        query_builder.push(
            " ON CONFLICT (streamer_id, master_item_id) DO NOTHING \
             RETURNING streamer_id, master_item_id, enabled, price",
        );

        let mut created = query_builder
            .build_query_as::<StreamerItem>()
            .fetch_all(&self.pool)
            .await?;
        created.sort_by_key(|item| item.master_item_id);
        Ok(created)
    }
}

#[derive(Debug, Clone)]
/// Update an existing override. Returns `None` when the streamer has no row for the item.
pub struct UpdateStreamerItem {
    pub streamer_id: String,
    pub master_item_id: i32,
    pub enabled: bool,
    pub price: i32,
}

impl Processor<UpdateStreamerItem> for DatabaseProcessor {
    type Output = Option<StreamerItem>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpdateStreamerItem")]
    async fn process(&self, update: UpdateStreamerItem) -> Result<Option<StreamerItem>, sqlx::Error> {
        sqlx::query_as::<_, StreamerItem>(
            r#"
            UPDATE streamer_items SET enabled = $3, price = $4
            WHERE streamer_id = $1 AND master_item_id = $2
            RETURNING streamer_id, master_item_id, enabled, price
            "#,
        )
        .bind(update.streamer_id)
        .bind(update.master_item_id)
        .bind(update.enabled)
        .bind(update.price)
        .fetch_optional(&self.pool)
        .await
    }
}
