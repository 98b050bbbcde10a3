use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

/// A spawnable item type.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MasterItem {
    pub item_id: i32,
    pub name: String,
    pub enabled: bool,
    pub default_price: i32,
}

#[derive(Debug, Clone)]
pub struct GetMasterItem {
    pub item_id: i32,
}

impl Processor<GetMasterItem> for DatabaseProcessor {
    type Output = Option<MasterItem>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetMasterItem")]
    async fn process(&self, query: GetMasterItem) -> Result<Option<MasterItem>, sqlx::Error> {
        sqlx::query_as::<_, MasterItem>(
            "SELECT item_id, name, enabled, default_price FROM master_items WHERE item_id = $1",
        )
        .bind(query.item_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// All globally enabled master items, ordered by `item_id`.
pub struct ListEnabledMasterItems;

impl Processor<ListEnabledMasterItems> for DatabaseProcessor {
    type Output = Vec<MasterItem>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListEnabledMasterItems")]
    async fn process(&self, _query: ListEnabledMasterItems) -> Result<Vec<MasterItem>, sqlx::Error> {
        sqlx::query_as::<_, MasterItem>(
            r#"
            SELECT item_id, name, enabled, default_price
            FROM master_items
            WHERE enabled
            ORDER BY item_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Insert or update many master items in a single query, keyed by `item_id`.
///
/// Returns the number of rows written.
pub struct UpsertMasterItems {
    pub items: Vec<MasterItem>,
}

impl Processor<UpsertMasterItems> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertMasterItems")]
    async fn process(&self, upsert: UpsertMasterItems) -> Result<u64, sqlx::Error> {
        if upsert.items.is_empty() {
            return Ok(0);
        }

        let mut query_builder = sqlx::QueryBuilder::new(
            "INSERT INTO master_items (item_id, name, enabled, default_price) ",
        );

        query_builder.push_values(upsert.items, |mut b, item| {
            b.push_bind(item.item_id)
                .push_bind(item.name)
                .push_bind(item.enabled)
                .push_bind(item.default_price);
        });

        query_builder.push(
            " ON CONFLICT (item_id) DO UPDATE SET \
             name = EXCLUDED.name, enabled = EXCLUDED.enabled, default_price = EXCLUDED.default_price",
        );

        let result = query_builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
