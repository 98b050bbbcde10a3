//! Effective item catalog per streamer.
//!
//! A streamer sees every globally enabled master item. The override row,
//! when present, decides price and whether the item is on; without one the
//! item is listed at its default price and switched off.

use crate::entities::master_items::MasterItem;
use crate::entities::streamer_items::StreamerItem;
use crate::store::CatalogStore;
use itemdrop_sdk::objects::EffectiveItem;
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("item {0} not found for this streamer")]
    ItemNotFound(i32),

    #[error("price must not be negative (got {0})")]
    InvalidPrice(i32),
}

/// Merge globally enabled master items with one streamer's overrides.
///
/// `master_items` must already be filtered to enabled items; the result
/// keeps their `item_id` order.
pub fn merge_effective_items(
    master_items: Vec<MasterItem>,
    overrides: &[StreamerItem],
) -> Vec<EffectiveItem> {
    let by_item: HashMap<i32, &StreamerItem> = overrides
        .iter()
        .map(|o| (o.master_item_id, o))
        .collect();

    let mut items: Vec<EffectiveItem> = master_items
        .into_iter()
        .filter(|m| m.enabled)
        .map(|m| {
            let item_override = by_item.get(&m.item_id);
            EffectiveItem {
                item_id: m.item_id,
                price: item_override.map_or(m.default_price, |o| o.price),
                enabled: item_override.is_some_and(|o| o.enabled),
                name: m.name,
            }
        })
        .collect();
    items.sort_by_key(|item| item.item_id);
    items
}

/// The catalog a streamer's viewers see, ordered by item id.
pub async fn list_effective_items<S>(
    store: &S,
    streamer_id: &str,
) -> Result<Vec<EffectiveItem>, CatalogError>
where
    S: CatalogStore + ?Sized,
{
    let master_items = store.enabled_master_items().await?;
    let overrides = store.streamer_items(streamer_id).await?;
    Ok(merge_effective_items(master_items, &overrides))
}

/// Create an enabled override at default price for every globally enabled
/// item the streamer does not have yet.
///
/// Returns the rows created; empty when nothing was missing.
pub async fn provision_default_items<S>(
    store: &S,
    streamer_id: &str,
) -> Result<Vec<StreamerItem>, CatalogError>
where
    S: CatalogStore + ?Sized,
{
    let rows: Vec<StreamerItem> = store
        .enabled_master_items()
        .await?
        .into_iter()
        .map(|m| StreamerItem {
            streamer_id: streamer_id.to_string(),
            master_item_id: m.item_id,
            enabled: true,
            price: m.default_price,
        })
        .collect();

    let created = store.insert_streamer_items_if_absent(rows).await?;
    if !created.is_empty() {
        info!(%streamer_id, created = created.len(), "Provisioned default streamer items");
    }
    Ok(created)
}

/// Change a streamer's existing override.
pub async fn update_item_override<S>(
    store: &S,
    streamer_id: &str,
    item_id: i32,
    enabled: bool,
    price: i32,
) -> Result<StreamerItem, CatalogError>
where
    S: CatalogStore + ?Sized,
{
    if price < 0 {
        return Err(CatalogError::InvalidPrice(price));
    }
    store
        .update_streamer_item(streamer_id, item_id, enabled, price)
        .await?
        .ok_or(CatalogError::ItemNotFound(item_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;

    fn master(item_id: i32, name: &str, enabled: bool, default_price: i32) -> MasterItem {
        MasterItem {
            item_id,
            name: name.to_string(),
            enabled,
            default_price,
        }
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_master_item(master(1, "A", true, 10));
        store.add_master_item(master(2, "B", true, 20));
        store.add_master_item(master(3, "C", true, 30));
        store.add_master_item(master(4, "D", false, 40));
        store
    }

    #[tokio::test]
    async fn test_merge_uses_overrides_and_defaults() {
        let store = seeded();
        store.add_streamer_item("s1", 1, true, 11);
        store.add_streamer_item("s1", 2, false, 22);

        let items = list_effective_items(&store, "s1").await.unwrap();

        assert_eq!(
            items,
            vec![
                EffectiveItem { item_id: 1, name: "A".into(), price: 11, enabled: true },
                EffectiveItem { item_id: 2, name: "B".into(), price: 22, enabled: false },
                EffectiveItem { item_id: 3, name: "C".into(), price: 30, enabled: false },
            ]
        );
    }

    #[tokio::test]
    async fn test_globally_disabled_item_hidden_despite_override() {
        let store = seeded();
        store.add_streamer_item("s1", 4, true, 1);

        let items = list_effective_items(&store, "s1").await.unwrap();

        assert!(items.iter().all(|item| item.item_id != 4));
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn test_overrides_of_other_streamers_ignored() {
        let store = seeded();
        store.add_streamer_item("s2", 1, true, 99);

        let items = list_effective_items(&store, "s1").await.unwrap();
        assert_eq!(items[0].price, 10);
        assert!(!items[0].enabled);
    }

    #[tokio::test]
    async fn test_provisioning_is_idempotent() {
        let store = seeded();
        store.add_streamer_item("s1", 2, false, 5);

        let created = provision_default_items(&store, "s1").await.unwrap();
        let ids: Vec<i32> = created.iter().map(|i| i.master_item_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(created.iter().all(|i| i.enabled));
        assert_eq!(created[1].price, 30);

        // The existing override is left alone
        let b = store.streamer_item("s1", 2).await.unwrap().unwrap();
        assert!(!b.enabled);
        assert_eq!(b.price, 5);

        let again = provision_default_items(&store, "s1").await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_update_override() {
        let store = seeded();
        store.add_streamer_item("s1", 1, true, 10);

        let updated = update_item_override(&store, "s1", 1, false, 3).await.unwrap();
        assert!(!updated.enabled);
        assert_eq!(updated.price, 3);

        assert!(matches!(
            update_item_override(&store, "s1", 2, true, 3).await,
            Err(CatalogError::ItemNotFound(2))
        ));
        assert!(matches!(
            update_item_override(&store, "s1", 1, true, -1).await,
            Err(CatalogError::InvalidPrice(-1))
        ));
    }
}
