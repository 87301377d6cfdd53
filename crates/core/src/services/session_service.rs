use chrono::{DateTime, TimeDelta, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::config::{CoordinatorConfig, Credentials};
use crate::providers::traits::{BrokerContext, BrokerProvider};

/// An authenticated broker context, the credentials it logged in with and
/// the moment it was created.
///
/// Cheap to clone; clones share the same underlying HTTP context and `id`.
#[derive(Clone)]
pub struct Session {
    id: Uuid,
    context: Arc<dyn BrokerContext>,
    credentials: Credentials,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn context(&self) -> &Arc<dyn BrokerContext> {
        &self.context
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Credentials the session authenticated with.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.created_at
    }

    /// A session is usable while its age is strictly below the lifetime.
    pub fn is_valid_at(&self, now: DateTime<Utc>, lifetime: TimeDelta) -> bool {
        self.age_at(now) < lifetime
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("username", &self.credentials.username)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Owns the single authenticated session of one coordinator.
///
/// - Sessions are created lazily on first use, through the two-step login.
/// - A cached session is reused until it reaches the configured lifetime, and
///   only by callers presenting the credentials it logged in with.
/// - [`invalidate`](Self::invalidate) drops the cached session, e.g. after a
///   credentials change. A login that was already running when the
///   invalidation happened still serves its caller but is never cached.
pub struct SessionManager {
    provider: Arc<dyn BrokerProvider>,
    cached: Mutex<Option<Session>>,
    /// Bumped on every invalidation.
    generation: AtomicU64,
    /// Serializes logins so concurrent callers share one new session.
    login_gate: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn BrokerProvider>) -> Self {
        Self {
            provider,
            cached: Mutex::new(None),
            generation: AtomicU64::new(0),
            login_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Return the cached session if still valid, otherwise log in again.
    pub async fn acquire_session(&self, config: &CoordinatorConfig) -> Result<Session, CoreError> {
        self.acquire_session_at(config, Utc::now()).await
    }

    /// Same as [`acquire_session`](Self::acquire_session) with an explicit clock reading.
    #[tracing::instrument(level = "debug", skip_all, fields(account_id = config.account_id))]
    pub async fn acquire_session_at(
        &self,
        config: &CoordinatorConfig,
        now: DateTime<Utc>,
    ) -> Result<Session, CoreError> {
        // Taken before queueing on the gate: an invalidation while we wait
        // means the caller's config may already be stale.
        let generation = self.generation.load(Ordering::SeqCst);

        if let Some(session) = self.valid_cached(config, now) {
            debug!(session_id = %session.id, "Returning existing HTTP session");
            return Ok(session);
        }

        let _gate = self.login_gate.lock().await;

        // Whoever held the gate before us may have just logged in.
        if let Some(session) = self.valid_cached(config, now) {
            debug!(session_id = %session.id, "Returning HTTP session created while waiting");
            return Ok(session);
        }

        let session = self.login(&config.credentials, now).await?;

        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if self.generation.load(Ordering::SeqCst) == generation {
            *cached = Some(session.clone());
        } else {
            debug!(session_id = %session.id, "Configuration replaced during login, session not cached");
        }

        Ok(session)
    }

    /// Discard the cached session; the next acquisition logs in again.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = cached.take() {
            debug!(session_id = %old.id, "Invalidated HTTP session");
        }
    }

    /// The currently cached session, valid or not.
    pub fn cached_session(&self) -> Option<Session> {
        self.cached
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn valid_cached(&self, config: &CoordinatorConfig, now: DateTime<Utc>) -> Option<Session> {
        let cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        cached
            .as_ref()
            .filter(|s| {
                s.credentials == config.credentials && s.is_valid_at(now, config.session_lifetime)
            })
            .cloned()
    }

    async fn login(
        &self,
        credentials: &Credentials,
        now: DateTime<Utc>,
    ) -> Result<Session, CoreError> {
        debug!(provider = self.provider.name(), "[session] Creating new HTTP session");
        let context = self.provider.new_context()?;

        debug!("[session] Requesting website login page");
        context.visit_login_page().await?;
        debug!("[session] Website login page OK");

        debug!(username = %credentials.username, "[session] Submitting credentials");
        context.submit_credentials(credentials).await?;
        debug!("[session] Credentials accepted");

        Ok(Session {
            id: Uuid::new_v4(),
            context,
            credentials: credentials.clone(),
            created_at: now,
        })
    }
}
