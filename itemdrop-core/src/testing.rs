//! In-memory doubles for the persistence, provider and timer seams.

#![allow(clippy::unwrap_used)]

use crate::auth::{
    CredentialStore, OAuthProvider, ProviderError, RefreshTimer, TimerHandle, TokenGrant,
};
use crate::entities::TokenSource;
use crate::entities::master_items::MasterItem;
use crate::entities::streamer_items::StreamerItem;
use crate::entities::streamers::Streamer;
use crate::entities::tokens::{EventCredit, PLATFORM_TWITCH, Token, TokenEventKey};
use crate::entities::viewers::Viewer;
use crate::store::{CatalogStore, PartyStore, TokenStore};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::{OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

fn now() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

#[derive(Default)]
struct Tables {
    streamers: HashMap<String, Streamer>,
    viewers: HashMap<String, Viewer>,
    master_items: BTreeMap<i32, MasterItem>,
    streamer_items: BTreeMap<(String, i32), StreamerItem>,
    tokens: Vec<Token>,
    credentials: HashMap<String, String>,
}

/// Every table behind one lock, so each store call is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    round_trips: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make party lookups and credits yield to the scheduler first, the way
    /// a database round trip would.
    pub fn simulate_round_trips(&self) {
        self.round_trips.store(true, Ordering::SeqCst);
    }

    async fn round_trip(&self) {
        if self.round_trips.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn add_master_item(&self, item: MasterItem) {
        self.tables().master_items.insert(item.item_id, item);
    }

    pub fn add_streamer_item(&self, streamer_id: &str, item_id: i32, enabled: bool, price: i32) {
        self.tables().streamer_items.insert(
            (streamer_id.to_string(), item_id),
            StreamerItem {
                streamer_id: streamer_id.to_string(),
                master_item_id: item_id,
                enabled,
                price,
            },
        );
    }

    pub fn add_streamer(
        &self,
        profile_id: &str,
        display_name: &str,
        channel_id: &str,
        items_enabled: bool,
    ) -> Streamer {
        let streamer = Streamer {
            twitch_profile_id: profile_id.to_string(),
            display_name: display_name.to_string(),
            items_enabled,
            channel_id: channel_id.to_string(),
            channel_point_reward_created: false,
            created_at: now(),
        };
        self.tables()
            .streamers
            .insert(profile_id.to_string(), streamer.clone());
        streamer
    }

    pub fn add_viewer(&self, profile_id: &str, display_name: Option<&str>) -> Viewer {
        let viewer = Viewer {
            twitch_profile_id: profile_id.to_string(),
            display_name: display_name.map(str::to_string),
            created_at: now(),
        };
        self.tables()
            .viewers
            .insert(profile_id.to_string(), viewer.clone());
        viewer
    }

    pub fn add_live_tokens(
        &self,
        viewer_id: &str,
        streamer_id: &str,
        source: TokenSource,
        source_event_id: &str,
        count: usize,
    ) -> Vec<Uuid> {
        let key = TokenEventKey {
            viewer_id: viewer_id.to_string(),
            streamer_id: streamer_id.to_string(),
            platform: PLATFORM_TWITCH.to_string(),
            source,
            source_event_id: source_event_id.to_string(),
        };
        let mut tables = self.tables();
        (0..count).map(|_| push_token(&mut tables, &key)).collect()
    }

    pub fn token(&self, id: Uuid) -> Option<Token> {
        self.tables().tokens.iter().find(|t| t.id == id).cloned()
    }

    pub fn token_count(&self) -> usize {
        self.tables().tokens.len()
    }

    pub fn live_token_count(&self, viewer_id: &str, streamer_id: &str) -> usize {
        self.tables()
            .tokens
            .iter()
            .filter(|t| {
                t.viewer_id == viewer_id && t.streamer_id == streamer_id && t.redeemed_at.is_none()
            })
            .count()
    }

    /// Spend every live token of the pair on `item_id`.
    pub fn redeem_all(&self, viewer_id: &str, streamer_id: &str, item_id: i32) {
        let redeemed_at = now();
        for token in self.tables().tokens.iter_mut().filter(|t| {
            t.viewer_id == viewer_id && t.streamer_id == streamer_id && t.redeemed_at.is_none()
        }) {
            token.redeemed_at = Some(redeemed_at);
            token.redeemed_for = Some(item_id);
        }
    }

    pub fn set_credential(&self, identity: &str, refresh_token: &str) {
        self.tables()
            .credentials
            .insert(identity.to_string(), refresh_token.to_string());
    }

    pub fn credential(&self, identity: &str) -> Option<String> {
        self.tables().credentials.get(identity).cloned()
    }
}

fn push_token(tables: &mut Tables, key: &TokenEventKey) -> Uuid {
    let id = Uuid::now_v7();
    tables.tokens.push(Token {
        id,
        viewer_id: key.viewer_id.clone(),
        streamer_id: key.streamer_id.clone(),
        platform: key.platform.clone(),
        source: key.source,
        source_event_id: key.source_event_id.clone(),
        created_at: now(),
        redeemed_at: None,
        redeemed_for: None,
    });
    id
}

fn is_live_owned(token: &Token, viewer_id: &str, streamer_id: &str, token_ids: &[Uuid]) -> bool {
    token.viewer_id == viewer_id
        && token.streamer_id == streamer_id
        && token.redeemed_at.is_none()
        && token_ids.contains(&token.id)
}

#[async_trait]
impl PartyStore for MemoryStore {
    async fn find_streamer(&self, profile_id: &str) -> Result<Option<Streamer>, sqlx::Error> {
        self.round_trip().await;
        Ok(self.tables().streamers.get(profile_id).cloned())
    }

    async fn create_streamer(
        &self,
        profile_id: &str,
        display_name: &str,
        channel_id: &str,
    ) -> Result<Streamer, sqlx::Error> {
        let mut tables = self.tables();
        let streamer = tables
            .streamers
            .entry(profile_id.to_string())
            .and_modify(|s| s.display_name = display_name.to_string())
            .or_insert_with(|| Streamer {
                twitch_profile_id: profile_id.to_string(),
                display_name: display_name.to_string(),
                items_enabled: false,
                channel_id: channel_id.to_string(),
                channel_point_reward_created: false,
                created_at: now(),
            });
        Ok(streamer.clone())
    }

    async fn set_items_enabled(
        &self,
        profile_id: &str,
        items_enabled: bool,
    ) -> Result<Option<Streamer>, sqlx::Error> {
        Ok(self.tables().streamers.get_mut(profile_id).map(|s| {
            s.items_enabled = items_enabled;
            s.clone()
        }))
    }

    async fn mark_reward_created(&self, profile_id: &str) -> Result<(), sqlx::Error> {
        if let Some(s) = self.tables().streamers.get_mut(profile_id) {
            s.channel_point_reward_created = true;
        }
        Ok(())
    }

    async fn find_viewer(&self, profile_id: &str) -> Result<Option<Viewer>, sqlx::Error> {
        self.round_trip().await;
        Ok(self.tables().viewers.get(profile_id).cloned())
    }

    async fn ensure_viewer(&self, profile_id: &str) -> Result<Viewer, sqlx::Error> {
        let mut tables = self.tables();
        let viewer = tables
            .viewers
            .entry(profile_id.to_string())
            .or_insert_with(|| Viewer {
                twitch_profile_id: profile_id.to_string(),
                display_name: None,
                created_at: now(),
            });
        Ok(viewer.clone())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn master_item(&self, item_id: i32) -> Result<Option<MasterItem>, sqlx::Error> {
        Ok(self.tables().master_items.get(&item_id).cloned())
    }

    async fn enabled_master_items(&self) -> Result<Vec<MasterItem>, sqlx::Error> {
        Ok(self
            .tables()
            .master_items
            .values()
            .filter(|m| m.enabled)
            .cloned()
            .collect())
    }

    async fn streamer_item(
        &self,
        streamer_id: &str,
        item_id: i32,
    ) -> Result<Option<StreamerItem>, sqlx::Error> {
        Ok(self
            .tables()
            .streamer_items
            .get(&(streamer_id.to_string(), item_id))
            .cloned())
    }

    async fn streamer_items(&self, streamer_id: &str) -> Result<Vec<StreamerItem>, sqlx::Error> {
        Ok(self
            .tables()
            .streamer_items
            .values()
            .filter(|i| i.streamer_id == streamer_id)
            .cloned()
            .collect())
    }

    async fn insert_streamer_items_if_absent(
        &self,
        items: Vec<StreamerItem>,
    ) -> Result<Vec<StreamerItem>, sqlx::Error> {
        let mut tables = self.tables();
        let mut created = Vec::new();
        for item in items {
            let key = (item.streamer_id.clone(), item.master_item_id);
            if !tables.streamer_items.contains_key(&key) {
                tables.streamer_items.insert(key, item.clone());
                created.push(item);
            }
        }
        created.sort_by_key(|i| i.master_item_id);
        Ok(created)
    }

    async fn update_streamer_item(
        &self,
        streamer_id: &str,
        item_id: i32,
        enabled: bool,
        price: i32,
    ) -> Result<Option<StreamerItem>, sqlx::Error> {
        Ok(self
            .tables()
            .streamer_items
            .get_mut(&(streamer_id.to_string(), item_id))
            .map(|i| {
                i.enabled = enabled;
                i.price = price;
                i.clone()
            }))
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn credit_event(
        &self,
        key: &TokenEventKey,
        amount: u32,
    ) -> Result<EventCredit, sqlx::Error> {
        self.round_trip().await;
        let mut tables = self.tables();
        let existing = tables
            .tokens
            .iter()
            .filter(|t| {
                t.viewer_id == key.viewer_id
                    && t.streamer_id == key.streamer_id
                    && t.platform == key.platform
                    && t.source == key.source
                    && t.source_event_id == key.source_event_id
            })
            .count() as i64;
        let shortfall = u32::try_from(i64::from(amount) - existing).unwrap_or(0);
        for _ in 0..shortfall {
            push_token(&mut tables, key);
        }
        Ok(EventCredit {
            existing,
            created: u64::from(shortfall),
        })
    }

    async fn insert_tokens(&self, key: &TokenEventKey, count: u32) -> Result<u64, sqlx::Error> {
        let mut tables = self.tables();
        for _ in 0..count {
            push_token(&mut tables, key);
        }
        Ok(u64::from(count))
    }

    async fn live_tokens(
        &self,
        viewer_id: &str,
        streamer_id: &str,
        platform: &str,
    ) -> Result<Vec<Token>, sqlx::Error> {
        Ok(self
            .tables()
            .tokens
            .iter()
            .filter(|t| {
                t.viewer_id == viewer_id
                    && t.streamer_id == streamer_id
                    && t.platform == platform
                    && t.redeemed_at.is_none()
            })
            .cloned()
            .collect())
    }

    async fn count_live_owned(
        &self,
        viewer_id: &str,
        streamer_id: &str,
        token_ids: &[Uuid],
    ) -> Result<i64, sqlx::Error> {
        let count = self
            .tables()
            .tokens
            .iter()
            .filter(|t| is_live_owned(t, viewer_id, streamer_id, token_ids))
            .count();
        Ok(count as i64)
    }

    async fn redeem_tokens(
        &self,
        viewer_id: &str,
        streamer_id: &str,
        token_ids: &[Uuid],
        item_id: i32,
        count: i64,
    ) -> Result<u64, sqlx::Error> {
        let mut tables = self.tables();
        let wanted = usize::try_from(count).unwrap_or(0);
        let candidates: Vec<usize> = tables
            .tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| is_live_owned(t, viewer_id, streamer_id, token_ids))
            .map(|(index, _)| index)
            .take(wanted)
            .collect();
        if candidates.len() < wanted {
            return Ok(0);
        }

        let redeemed_at = now();
        for index in &candidates {
            let token = &mut tables.tokens[*index];
            token.redeemed_at = Some(redeemed_at);
            token.redeemed_for = Some(item_id);
        }
        Ok(candidates.len() as u64)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load(&self, identity: &str) -> Result<Option<String>, sqlx::Error> {
        Ok(self.credential(identity))
    }

    async fn save(&self, identity: &str, refresh_token: &str) -> Result<(), sqlx::Error> {
        self.set_credential(identity, refresh_token);
        Ok(())
    }

    async fn delete(&self, identity: &str) -> Result<(), sqlx::Error> {
        self.tables().credentials.remove(identity);
        Ok(())
    }
}

type Scripted = Result<TokenGrant, ProviderError>;

/// An OAuth provider answering from scripted queues.
///
/// An exhausted queue answers with an upstream error.
pub struct FakeProvider {
    login: Mutex<String>,
    exchanges: Mutex<VecDeque<Scripted>>,
    refreshes: Mutex<VecDeque<Scripted>>,
    refresh_tokens_seen: Mutex<Vec<String>>,
    refresh_calls: AtomicUsize,
    latency: Mutex<Duration>,
}

impl FakeProvider {
    pub fn new(login: &str) -> Self {
        Self {
            login: Mutex::new(login.to_string()),
            exchanges: Mutex::default(),
            refreshes: Mutex::default(),
            refresh_tokens_seen: Mutex::default(),
            refresh_calls: AtomicUsize::new(0),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set_login(&self, login: &str) {
        *self.login.lock().unwrap() = login.to_string();
    }

    /// Delay every refresh call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn push_exchange(&self, response: Scripted) {
        self.exchanges.lock().unwrap().push_back(response);
    }

    pub fn push_refresh(&self, response: Scripted) {
        self.refreshes.lock().unwrap().push_back(response);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.refresh_tokens_seen.lock().unwrap().clone()
    }

    fn unscripted() -> Scripted {
        Err(ProviderError::Upstream {
            status: 500,
            message: "no scripted response".to_string(),
        })
    }
}

#[async_trait]
impl OAuthProvider for FakeProvider {
    async fn exchange_code(&self, _code: &str) -> Result<TokenGrant, ProviderError> {
        self.exchanges
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Self::unscripted)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_tokens_seen
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.refreshes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Self::unscripted)
    }

    async fn fetch_login(&self, _access_token: &str) -> Result<String, ProviderError> {
        Ok(self.login.lock().unwrap().clone())
    }
}

struct ManualTask {
    delay: Duration,
    task: Option<BoxFuture<'static, ()>>,
    cancelled: Arc<AtomicBool>,
}

/// A timer that only fires when told to.
#[derive(Default)]
pub struct ManualTimer {
    tasks: Mutex<Vec<ManualTask>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays of every task scheduled so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.tasks.lock().unwrap().iter().map(|t| t.delay).collect()
    }

    /// Whether each scheduled task was cancelled, in order.
    pub fn cancelled(&self) -> Vec<bool> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.cancelled.load(Ordering::SeqCst))
            .collect()
    }

    /// Run the oldest task that is neither cancelled nor fired yet.
    ///
    /// Returns `false` if there was none.
    pub async fn fire_next(&self) -> bool {
        let task = self
            .tasks
            .lock()
            .unwrap()
            .iter_mut()
            .find(|t| t.task.is_some() && !t.cancelled.load(Ordering::SeqCst))
            .and_then(|t| t.task.take());
        match task {
            Some(task) => {
                task.await;
                true
            }
            None => false,
        }
    }
}

impl RefreshTimer for ManualTimer {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.tasks.lock().unwrap().push(ManualTask {
            delay,
            task: Some(task),
            cancelled: cancelled.clone(),
        });
        TimerHandle::new(move || cancelled.store(true, Ordering::SeqCst))
    }
}
