//! Token lifecycle for the bot identity.
//!
//! One [`TokenLifecycleManager`] per process keeps a valid access token for
//! the configured bot account. Refreshes are single-flight: every caller
//! that needs a refresh while one is running awaits the same result, so the
//! one-time refresh token is never exchanged twice. Each successful grant
//! schedules the next refresh ahead of expiry.

mod credentials;
mod provider;
mod timer;

pub use credentials::CredentialStore;
pub(crate) use provider::error_message;
pub use provider::{OAuthProvider, ProviderError, TokenGrant};
pub use timer::{RefreshTimer, TimerHandle, TokioTimer};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use itemdrop_sdk::objects::BotState;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Refresh this long before the access token expires.
pub const EXPIRY_BUFFER: Duration = Duration::from_secs(5 * 60);
/// Failed refresh attempts (rate limits excluded) before giving up.
pub const MAX_REFRESH_ATTEMPTS: u32 = 3;
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Lower bound for the proactive refresh delay.
pub const MIN_REFRESH_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Error)]
pub enum TokenError {
    #[error("authorized account {actual} is not the bot account {expected}")]
    AuthorizationRejected { expected: String, actual: String },

    #[error("OAuth client misconfigured: {0}")]
    ConfigurationError(String),

    #[error("bot must be re-authorized")]
    ReauthorizationRequired,

    #[error("token refresh failed after {attempts} attempts: {last_error}")]
    RefreshExhausted { attempts: u32, last_error: String },

    #[error("bot has not been authorized yet")]
    NotAuthorized,

    #[error("authorization code exchange failed: {0}")]
    Exchange(String),

    #[error("credential store error: {0}")]
    Store(String),

    #[error("refresh task failed: {0}")]
    TaskFailed(String),
}

/// Delay before retry number `retry_count` (zero based): 1s, 2s, 4s, ...
pub fn calculate_retry_delay(retry_count: u32) -> Duration {
    INITIAL_RETRY_DELAY * 2u32.pow(retry_count.min(10))
}

type SharedRefresh = Shared<BoxFuture<'static, Result<String, TokenError>>>;

struct Session {
    access_token: Option<String>,
    expires_at: Option<Instant>,
    /// The running refresh, tagged with its generation.
    in_flight: Option<(u64, SharedRefresh)>,
    generation: u64,
    /// The pending proactive refresh, tagged with its timer id.
    scheduled: Option<(u64, TimerHandle)>,
    timer_seq: u64,
    state: BotState,
}

impl Session {
    fn empty() -> Self {
        Self {
            access_token: None,
            expires_at: None,
            in_flight: None,
            generation: 0,
            scheduled: None,
            timer_seq: 0,
            state: BotState::Uninitialized,
        }
    }

    fn fresh_access_token(&self, now: Instant) -> Option<&str> {
        match (&self.access_token, self.expires_at) {
            (Some(token), Some(expires_at)) if now + EXPIRY_BUFFER < expires_at => {
                Some(token.as_str())
            }
            _ => None,
        }
    }
}

struct Inner {
    provider: Arc<dyn OAuthProvider>,
    credentials: Arc<dyn CredentialStore>,
    timer: Arc<dyn RefreshTimer>,
    bot_account: String,
    session: Mutex<Session>,
}

/// Keeps the bot's access token valid. Cheap to clone.
#[derive(Clone)]
pub struct TokenLifecycleManager {
    inner: Arc<Inner>,
}

impl TokenLifecycleManager {
    pub fn new(
        provider: Arc<dyn OAuthProvider>,
        credentials: Arc<dyn CredentialStore>,
        timer: Arc<dyn RefreshTimer>,
        bot_account: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                credentials,
                timer,
                bot_account: bot_account.into(),
                session: Mutex::new(Session::empty()),
            }),
        }
    }

    pub fn bot_account(&self) -> &str {
        &self.inner.bot_account
    }

    /// Forget the in-memory session and cancel any scheduled refresh.
    ///
    /// The stored refresh token is kept.
    pub async fn initialize(&self) {
        let mut session = self.inner.session.lock().await;
        if let Some((_, handle)) = session.scheduled.take() {
            handle.cancel();
        }
        let generation = session.generation;
        let timer_seq = session.timer_seq;
        *session = Session::empty();
        // Keep counters monotonic so stale tasks never match.
        session.generation = generation;
        session.timer_seq = timer_seq;
        debug!(bot_account = %self.inner.bot_account, "Token session reset");
    }

    pub async fn state(&self) -> BotState {
        self.inner.session.lock().await.state
    }

    /// Exchange a one-time code for the bot's first token pair.
    #[tracing::instrument(skip_all, fields(bot_account = %self.inner.bot_account))]
    pub async fn complete_authorization(&self, code: &str) -> Result<(), TokenError> {
        let inner = &self.inner;
        let grant = inner
            .provider
            .exchange_code(code)
            .await
            .map_err(|e| match e {
                ProviderError::InvalidClient(message) => TokenError::ConfigurationError(message),
                other => TokenError::Exchange(other.to_string()),
            })?;

        let login = inner
            .provider
            .fetch_login(&grant.access_token)
            .await
            .map_err(|e| TokenError::Exchange(e.to_string()))?;
        if !login.eq_ignore_ascii_case(&inner.bot_account) {
            warn!(%login, "Rejected authorization for a different account");
            return Err(TokenError::AuthorizationRejected {
                expected: inner.bot_account.clone(),
                actual: login,
            });
        }

        let refresh_token = grant
            .refresh_token
            .as_deref()
            .ok_or_else(|| TokenError::Exchange("grant carried no refresh token".to_string()))?;
        inner
            .credentials
            .save(&inner.bot_account, refresh_token)
            .await
            .map_err(|e| TokenError::Store(e.to_string()))?;

        let mut session = inner.session.lock().await;
        // A refresh still running with the previous token must not win.
        session.in_flight = None;
        inner.apply_grant(&mut session, &grant);
        info!("Bot authorized");
        Ok(())
    }

    /// The current access token, refreshed first when missing or close to
    /// expiry. `None` means the bot was never authorized.
    pub async fn get_valid_access_credential(&self) -> Result<Option<String>, TokenError> {
        let refresh = {
            let mut session = self.inner.session.lock().await;
            if let Some(token) = session.fresh_access_token(Instant::now()) {
                return Ok(Some(token.to_string()));
            }
            self.inner.start_or_join_refresh(&mut session)
        };

        match refresh.await {
            Ok(token) => Ok(Some(token)),
            Err(TokenError::NotAuthorized) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Refresh now, or join the refresh that is already running.
    pub async fn refresh_access_credential(&self) -> Result<String, TokenError> {
        let refresh = {
            let mut session = self.inner.session.lock().await;
            self.inner.start_or_join_refresh(&mut session)
        };
        refresh.await
    }
}

impl Inner {
    fn start_or_join_refresh(self: &Arc<Self>, session: &mut Session) -> SharedRefresh {
        if let Some((_, refresh)) = &session.in_flight {
            return refresh.clone();
        }

        session.generation += 1;
        let generation = session.generation;
        let prior_state = session.state;
        session.state = BotState::Refreshing;

        // Spawned so the refresh settles even if every waiter goes away.
        let task = tokio::spawn(self.clone().run_refresh(generation, prior_state));
        let refresh = async move {
            task.await
                .unwrap_or_else(|e| Err(TokenError::TaskFailed(e.to_string())))
        }
        .boxed()
        .shared();
        session.in_flight = Some((generation, refresh.clone()));
        refresh
    }

    async fn run_refresh(
        self: Arc<Self>,
        generation: u64,
        prior_state: BotState,
    ) -> Result<String, TokenError> {
        let outcome = self.refresh_with_retry().await;

        let mut session = self.session.lock().await;
        let current = session.in_flight.as_ref().map(|(g, _)| *g);
        if current != Some(generation) {
            debug!(generation, "Refresh result discarded, session was reset");
            return outcome.map(|grant| grant.access_token);
        }
        session.in_flight = None;

        match outcome {
            Ok(grant) => {
                self.apply_grant(&mut session, &grant);
                debug!("Access token refreshed");
                Ok(grant.access_token)
            }
            Err(err) => {
                session.state = match err {
                    TokenError::ReauthorizationRequired => {
                        session.access_token = None;
                        session.expires_at = None;
                        BotState::NeedsReauth
                    }
                    TokenError::NotAuthorized if prior_state != BotState::NeedsReauth => {
                        BotState::Uninitialized
                    }
                    _ => prior_state,
                };
                Err(err)
            }
        }
    }

    async fn refresh_with_retry(&self) -> Result<TokenGrant, TokenError> {
        let mut attempts = 0u32;
        loop {
            let refresh_token = self
                .credentials
                .load(&self.bot_account)
                .await
                .map_err(|e| TokenError::Store(e.to_string()))?
                .ok_or(TokenError::NotAuthorized)?;

            match self.provider.refresh(&refresh_token).await {
                Ok(grant) => {
                    if let Some(rotated) = grant.refresh_token.as_deref() {
                        if rotated != refresh_token {
                            if let Err(e) = self.credentials.save(&self.bot_account, rotated).await
                            {
                                error!(error = %e, "Failed to persist rotated refresh token");
                            }
                        }
                    }
                    return Ok(grant);
                }
                Err(ProviderError::InvalidRefreshToken(message)) => {
                    error!(
                        bot_account = %self.bot_account,
                        %message,
                        "Refresh token rejected, bot must be re-authorized"
                    );
                    if let Err(e) = self.credentials.delete(&self.bot_account).await {
                        error!(error = %e, "Failed to purge rejected refresh token");
                    }
                    return Err(TokenError::ReauthorizationRequired);
                }
                Err(ProviderError::InvalidClient(message)) => {
                    error!(%message, "Token endpoint rejected the client credentials");
                    return Err(TokenError::ConfigurationError(message));
                }
                Err(ProviderError::RateLimited { retry_after }) => {
                    warn!(?retry_after, "Token refresh rate limited");
                    tokio::time::sleep(retry_after).await;
                }
                Err(err) => {
                    attempts += 1;
                    if attempts >= MAX_REFRESH_ATTEMPTS {
                        error!(attempts, error = %err, "Token refresh gave up");
                        return Err(TokenError::RefreshExhausted {
                            attempts,
                            last_error: err.to_string(),
                        });
                    }
                    let delay = calculate_retry_delay(attempts - 1);
                    warn!(attempts, ?delay, error = %err, "Token refresh failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn apply_grant(self: &Arc<Self>, session: &mut Session, grant: &TokenGrant) {
        let lifetime = Duration::from_secs(grant.expires_in);
        session.access_token = Some(grant.access_token.clone());
        session.expires_at = Some(Instant::now() + lifetime);
        session.state = BotState::Active;
        self.schedule_refresh(session, lifetime);
    }

    fn schedule_refresh(self: &Arc<Self>, session: &mut Session, lifetime: Duration) {
        if let Some((_, handle)) = session.scheduled.take() {
            handle.cancel();
        }

        let delay = lifetime
            .saturating_sub(EXPIRY_BUFFER)
            .max(MIN_REFRESH_DELAY);
        session.timer_seq += 1;
        let timer_id = session.timer_seq;
        let weak = Arc::downgrade(self);

        let task = async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let refresh = {
                let mut session = inner.session.lock().await;
                match &session.scheduled {
                    // Dropping our own handle without cancelling it, the
                    // refresh below replaces it.
                    Some((id, _)) if *id == timer_id => session.scheduled = None,
                    _ => return,
                }
                inner.start_or_join_refresh(&mut session)
            };
            if let Err(e) = refresh.await {
                warn!(error = %e, "Proactive token refresh failed");
            }
        }
        .boxed();

        let handle = self.timer.schedule(delay, task);
        session.scheduled = Some((timer_id, handle));
        debug!(?delay, "Next token refresh scheduled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProvider, ManualTimer, MemoryStore};
    use futures_util::future::join_all;

    const BOT: &str = "DropBot";

    fn grant(access: &str, refresh: Option<&str>, expires_in: u64) -> TokenGrant {
        TokenGrant {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in,
        }
    }

    fn upstream() -> ProviderError {
        ProviderError::Upstream {
            status: 500,
            message: "boom".to_string(),
        }
    }

    struct Fixture {
        provider: Arc<FakeProvider>,
        store: Arc<MemoryStore>,
        timer: Arc<ManualTimer>,
        manager: TokenLifecycleManager,
    }

    fn fixture(stored_refresh: Option<&str>) -> Fixture {
        let provider = Arc::new(FakeProvider::new("dropbot"));
        let store = Arc::new(MemoryStore::new());
        if let Some(token) = stored_refresh {
            store.set_credential(BOT, token);
        }
        let timer = Arc::new(ManualTimer::new());
        let manager =
            TokenLifecycleManager::new(provider.clone(), store.clone(), timer.clone(), BOT);
        Fixture {
            provider,
            store,
            timer,
            manager,
        }
    }

    #[test]
    fn test_retry_delay_calculation() {
        assert_eq!(calculate_retry_delay(0), Duration::from_secs(1));
        assert_eq!(calculate_retry_delay(1), Duration::from_secs(2));
        assert_eq!(calculate_retry_delay(2), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_refresh() {
        let f = fixture(Some("r1"));
        f.provider.set_latency(Duration::from_millis(50));
        f.provider.push_refresh(Ok(grant("a1", Some("r1"), 3600)));

        let calls = (0..5).map(|_| f.manager.get_valid_access_credential());
        let results = join_all(calls).await;

        assert_eq!(f.provider.refresh_calls(), 1);
        for result in results {
            assert_eq!(result.unwrap().as_deref(), Some("a1"));
        }
        assert_eq!(f.manager.state().await, BotState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_token_is_served_from_memory() {
        let f = fixture(Some("r1"));
        f.provider.push_refresh(Ok(grant("a1", None, 3600)));

        f.manager.get_valid_access_credential().await.unwrap();
        tokio::time::advance(Duration::from_secs(3000)).await;
        let again = f.manager.get_valid_access_credential().await.unwrap();

        assert_eq!(again.as_deref(), Some("a1"));
        assert_eq!(f.provider.refresh_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_inside_buffer_is_refreshed() {
        let f = fixture(Some("r1"));
        f.provider.push_refresh(Ok(grant("a1", None, 3600)));
        f.provider.push_refresh(Ok(grant("a2", None, 3600)));

        f.manager.get_valid_access_credential().await.unwrap();
        tokio::time::advance(Duration::from_secs(3600 - 200)).await;
        let token = f.manager.get_valid_access_credential().await.unwrap();

        assert_eq!(token.as_deref(), Some("a2"));
        assert_eq!(f.provider.refresh_calls(), 2);
    }

    #[tokio::test]
    async fn test_never_authorized_yields_none() {
        let f = fixture(None);

        assert_eq!(f.manager.get_valid_access_credential().await.unwrap(), None);
        assert_eq!(f.provider.refresh_calls(), 0);
        assert_eq!(f.manager.state().await, BotState::Uninitialized);
        assert!(matches!(
            f.manager.refresh_access_credential().await,
            Err(TokenError::NotAuthorized)
        ));
    }

    #[tokio::test]
    async fn test_rejected_refresh_token_is_purged() {
        let f = fixture(Some("r1"));
        f.provider.push_refresh(Err(ProviderError::InvalidRefreshToken(
            "Invalid refresh token".to_string(),
        )));

        let result = f.manager.get_valid_access_credential().await;

        assert!(matches!(result, Err(TokenError::ReauthorizationRequired)));
        assert_eq!(f.store.credential(BOT), None);
        assert_eq!(f.manager.state().await, BotState::NeedsReauth);

        // Inert until a new authorization, no further upstream calls
        assert_eq!(f.manager.get_valid_access_credential().await.unwrap(), None);
        assert_eq!(f.manager.state().await, BotState::NeedsReauth);
        assert_eq!(f.provider.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_bad_client_is_not_retried() {
        let f = fixture(Some("r1"));
        f.provider
            .push_refresh(Err(ProviderError::InvalidClient("invalid client".to_string())));
        f.provider.push_refresh(Ok(grant("a1", None, 3600)));

        let result = f.manager.refresh_access_credential().await;

        assert!(matches!(result, Err(TokenError::ConfigurationError(_))));
        assert_eq!(f.provider.refresh_calls(), 1);
        assert_eq!(f.store.credential(BOT).as_deref(), Some("r1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limits_do_not_consume_attempts() {
        let f = fixture(Some("r1"));
        f.provider.push_refresh(Err(ProviderError::RateLimited {
            retry_after: Duration::from_secs(5),
        }));
        f.provider.push_refresh(Err(upstream()));
        f.provider.push_refresh(Err(ProviderError::RateLimited {
            retry_after: Duration::from_secs(5),
        }));
        f.provider.push_refresh(Err(upstream()));
        f.provider.push_refresh(Ok(grant("a1", None, 3600)));

        let token = f.manager.refresh_access_credential().await.unwrap();

        assert_eq!(token, "a1");
        assert_eq!(f.provider.refresh_calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded_with_backoff() {
        let f = fixture(Some("r1"));
        for _ in 0..3 {
            f.provider.push_refresh(Err(upstream()));
        }
        f.provider.push_refresh(Ok(grant("never", None, 3600)));

        let started = Instant::now();
        let result = f.manager.refresh_access_credential().await;

        assert!(matches!(
            result,
            Err(TokenError::RefreshExhausted { attempts: 3, .. })
        ));
        assert_eq!(f.provider.refresh_calls(), 3);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(f.store.credential(BOT).as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_persisted_and_used() {
        let f = fixture(Some("r1"));
        f.provider.push_refresh(Ok(grant("a1", Some("r2"), 3600)));
        f.provider.push_refresh(Ok(grant("a2", Some("r2"), 3600)));

        f.manager.refresh_access_credential().await.unwrap();
        assert_eq!(f.store.credential(BOT).as_deref(), Some("r2"));

        f.manager.refresh_access_credential().await.unwrap();
        assert_eq!(f.provider.refresh_tokens_seen(), vec!["r1", "r2"]);
    }

    #[tokio::test]
    async fn test_authorization_for_other_account_rejected() {
        let f = fixture(None);
        f.provider.set_login("someone_else");
        f.provider.push_exchange(Ok(grant("a1", Some("r1"), 3600)));

        let result = f.manager.complete_authorization("code").await;

        assert!(matches!(
            result,
            Err(TokenError::AuthorizationRejected { ref actual, .. }) if actual == "someone_else"
        ));
        assert_eq!(f.store.credential(BOT), None);
        assert_eq!(f.manager.state().await, BotState::Uninitialized);
        assert!(f.timer.delays().is_empty());
    }

    #[tokio::test]
    async fn test_authorization_matches_case_insensitively() {
        let f = fixture(None);
        f.provider.push_exchange(Ok(grant("a1", Some("r1"), 3600)));

        f.manager.complete_authorization("code").await.unwrap();

        assert_eq!(f.store.credential(BOT).as_deref(), Some("r1"));
        assert_eq!(f.manager.state().await, BotState::Active);
        assert_eq!(
            f.manager.get_valid_access_credential().await.unwrap().as_deref(),
            Some("a1")
        );
        assert_eq!(f.provider.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_exchange_errors() {
        let f = fixture(None);
        f.provider
            .push_exchange(Err(ProviderError::InvalidClient("invalid client".to_string())));
        f.provider.push_exchange(Ok(grant("a1", None, 3600)));

        assert!(matches!(
            f.manager.complete_authorization("code").await,
            Err(TokenError::ConfigurationError(_))
        ));
        assert!(matches!(
            f.manager.complete_authorization("code").await,
            Err(TokenError::Exchange(_))
        ));
    }

    #[tokio::test]
    async fn test_each_grant_replaces_the_scheduled_refresh() {
        let f = fixture(None);
        f.provider.push_exchange(Ok(grant("a1", Some("r1"), 3600)));
        f.provider.push_refresh(Ok(grant("a2", None, 60)));

        f.manager.complete_authorization("code").await.unwrap();
        f.manager.refresh_access_credential().await.unwrap();

        assert_eq!(
            f.timer.delays(),
            vec![Duration::from_secs(3300), MIN_REFRESH_DELAY]
        );
        assert_eq!(f.timer.cancelled(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_scheduled_refresh_runs_and_reschedules() {
        let f = fixture(None);
        f.provider.push_exchange(Ok(grant("a1", Some("r1"), 3600)));
        f.provider.push_refresh(Ok(grant("a2", None, 3600)));
        f.manager.complete_authorization("code").await.unwrap();

        assert!(f.timer.fire_next().await);

        assert_eq!(f.provider.refresh_calls(), 1);
        assert_eq!(f.timer.delays().len(), 2);
        // The fired timer was consumed, not cancelled
        assert_eq!(f.timer.cancelled(), vec![false, false]);
        assert_eq!(
            f.manager.get_valid_access_credential().await.unwrap().as_deref(),
            Some("a2")
        );
    }

    #[tokio::test]
    async fn test_initialize_cancels_timer_and_forgets_session() {
        let f = fixture(None);
        f.provider.push_exchange(Ok(grant("a1", Some("r1"), 3600)));
        f.provider.push_refresh(Ok(grant("a2", None, 3600)));
        f.manager.complete_authorization("code").await.unwrap();

        f.manager.initialize().await;
        f.manager.initialize().await;

        assert_eq!(f.timer.cancelled(), vec![true]);
        assert_eq!(f.manager.state().await, BotState::Uninitialized);
        assert!(!f.timer.fire_next().await);

        let token = f.manager.get_valid_access_credential().await.unwrap();
        assert_eq!(token.as_deref(), Some("a2"));
        assert_eq!(f.provider.refresh_calls(), 1);
    }
}
