use chrono::Utc;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::CoreError;
use crate::models::account::AccountDetails;
use crate::models::config::CoordinatorConfig;
use crate::models::position::Position;
use crate::models::snapshot::HoldingsSnapshot;
use crate::providers::traits::BrokerProvider;
use super::session_service::{Session, SessionManager};

/// End-to-end bound on one refresh (session + fetch).
pub const UPDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Receives every snapshot that replaced the previous one.
pub trait SnapshotListener: Send + Sync {
    fn on_snapshot(&self, snapshot: &Arc<HoldingsSnapshot>);
}

impl<F> SnapshotListener for F
where
    F: Fn(&Arc<HoldingsSnapshot>) + Send + Sync,
{
    fn on_snapshot(&self, snapshot: &Arc<HoldingsSnapshot>) {
        self(snapshot)
    }
}

/// Fetches holdings and publishes them as immutable snapshots.
///
/// Concurrency model:
/// - At most one refresh runs at a time; callers queue on `in_flight`.
/// - Configuration and snapshot are `Arc`s swapped under short-lived locks.
///   No lock is held across network I/O, so readers never block on a fetch
///   and always see a complete value.
/// - A refresh reads the configuration once when it starts and uses that
///   view throughout, even if the configuration is replaced meanwhile.
/// - On any failure the previous snapshot stays in place.
pub struct RefreshPipeline {
    sessions: SessionManager,
    config: RwLock<Arc<CoordinatorConfig>>,
    snapshot: RwLock<Option<Arc<HoldingsSnapshot>>>,
    listeners: RwLock<Vec<Arc<dyn SnapshotListener>>>,
    in_flight: tokio::sync::Mutex<()>,
    timeout: Duration,
}

impl RefreshPipeline {
    pub fn new(provider: Arc<dyn BrokerProvider>, config: CoordinatorConfig) -> Self {
        Self {
            sessions: SessionManager::new(provider),
            config: RwLock::new(Arc::new(config)),
            snapshot: RwLock::new(None),
            listeners: RwLock::new(Vec::new()),
            in_flight: tokio::sync::Mutex::new(()),
            timeout: UPDATE_TIMEOUT,
        }
    }

    /// Override the end-to-end refresh bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    // ── Configuration ───────────────────────────────────────────────

    /// The configuration the next refresh will use.
    pub fn config(&self) -> Arc<CoordinatorConfig> {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Swap in a new configuration and drop the cached session, since the
    /// credentials may have changed.
    pub fn replace_config(&self, config: CoordinatorConfig) {
        {
            let mut current = self.config.write().unwrap_or_else(|e| e.into_inner());
            *current = Arc::new(config);
        }
        self.sessions.invalidate();
        debug!("Configuration replaced, session reset");
    }

    /// Merge a discovered account currency into the stored configuration,
    /// unless that configuration was replaced since `seen` was read.
    fn merge_account_currency(&self, seen: &Arc<CoordinatorConfig>, currency: &str) {
        let mut current = self.config.write().unwrap_or_else(|e| e.into_inner());
        if Arc::ptr_eq(&*current, seen) {
            *current = Arc::new(seen.with_account_currency(currency));
        }
    }

    pub fn account_currency(&self) -> Option<String> {
        self.config().account_currency.clone()
    }

    // ── Snapshot access ─────────────────────────────────────────────

    /// The latest complete snapshot, `None` until the first successful fetch.
    pub fn get_snapshot(&self) -> Option<Arc<HoldingsSnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Position for a trading symbol in the latest snapshot.
    pub fn lookup(&self, symbol: &str) -> Option<Position> {
        self.get_snapshot()
            .and_then(|snapshot| snapshot.lookup(symbol).cloned())
    }

    pub fn subscribe(&self, listener: Arc<dyn SnapshotListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    // ── Remote operations ───────────────────────────────────────────

    /// Fetch the holdings and replace the snapshot.
    ///
    /// Waits for any refresh already in flight to finish first.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn refresh(&self) -> Result<Arc<HoldingsSnapshot>, CoreError> {
        let _in_flight = self.in_flight.lock().await;
        let config = self.config();

        debug!(account_id = config.account_id, "Refreshing holdings");
        let snapshot = tokio::time::timeout(self.timeout, self.fetch_snapshot(&config))
            .await
            .map_err(|_| CoreError::Timeout(self.timeout))??;

        let snapshot = Arc::new(snapshot);
        {
            let mut current = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
            *current = Some(snapshot.clone());
        }
        info!(
            account_id = config.account_id,
            positions = snapshot.len(),
            "Holdings snapshot updated"
        );

        self.notify(&snapshot);
        Ok(snapshot)
    }

    /// Look up account metadata. Used at setup, outside the polling policy.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_account_details(&self) -> Result<AccountDetails, CoreError> {
        let config = self.config();
        tokio::time::timeout(self.timeout, self.fetch_account_details(&config))
            .await
            .map_err(|_| CoreError::Timeout(self.timeout))?
    }

    /// Discover the account currency and merge it into the configuration.
    pub async fn discover_account_currency(&self) -> Result<AccountDetails, CoreError> {
        let config = self.config();
        let details = tokio::time::timeout(self.timeout, self.fetch_account_details(&config))
            .await
            .map_err(|_| CoreError::Timeout(self.timeout))??;
        self.merge_account_currency(&config, &details.account_currency);
        info!(currency = %details.account_currency, "Discovered account currency");
        Ok(details)
    }

    async fn fetch_account_details(
        &self,
        config: &CoordinatorConfig,
    ) -> Result<AccountDetails, CoreError> {
        let session = self.sessions.acquire_session(config).await?;
        account_details(&session, config.account_id).await
    }

    async fn fetch_snapshot(
        &self,
        config: &Arc<CoordinatorConfig>,
    ) -> Result<HoldingsSnapshot, CoreError> {
        let session = self.sessions.acquire_session(config).await?;

        let currency = match &config.account_currency {
            Some(currency) => currency.clone(),
            None => {
                debug!("Account currency unknown, discovering it once");
                let details = account_details(&session, config.account_id).await?;
                self.merge_account_currency(config, &details.account_currency);
                details.account_currency
            }
        };

        debug!(account_id = config.account_id, "Requesting positions");
        let raw = session.context().positions(config.account_id).await?;
        Ok(HoldingsSnapshot::from_raw(raw, &currency, Utc::now()))
    }

    fn notify(&self, snapshot: &Arc<HoldingsSnapshot>) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in listeners {
            listener.on_snapshot(snapshot);
        }
    }
}

async fn account_details(session: &Session, account_id: i64) -> Result<AccountDetails, CoreError> {
    debug!(account_id, "Requesting account info");
    session
        .context()
        .account_info(account_id)
        .await?
        .into_iter()
        .next()
        .map(AccountDetails::from)
        .ok_or_else(|| {
            CoreError::InvalidResponse(format!("No account info returned for account {account_id}"))
        })
}
