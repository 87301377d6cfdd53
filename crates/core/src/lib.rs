pub mod errors;
pub mod models;
pub mod providers;
pub mod registry;
pub mod services;

use chrono::Utc;
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use errors::CoreError;
use models::{
    account::AccountDetails,
    config::{CoordinatorConfig, RawOptions},
    position::Position,
    snapshot::HoldingsSnapshot,
};
use providers::traits::BrokerProvider;
use services::{
    polling_policy::{PollDecision, PollingPolicy},
    refresh_service::{RefreshPipeline, SnapshotListener},
    scheduler::{IntervalScheduler, Scheduler, TickCallback},
};

/// What one scheduler tick ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The polling policy decided the broker is not worth asking.
    Skipped(PollDecision),
    Refreshed {
        decision: PollDecision,
        positions: usize,
    },
    /// The refresh failed; the previous snapshot is still served.
    Failed {
        decision: PollDecision,
        error: CoreError,
    },
}

/// Main entry point for the Nordnet Holdings core library.
/// Keeps the holdings of one brokerage account up to date.
///
/// Ties together the refresh pipeline (session + fetch + snapshot), the
/// polling policy and a scheduler. Consumers read snapshots and per-symbol
/// lookups at any time without waiting on a refresh.
#[must_use]
pub struct HoldingsCoordinator {
    pipeline: Arc<RefreshPipeline>,
    policy: Arc<PollingPolicy>,
    scheduler: Box<dyn Scheduler>,
}

impl std::fmt::Debug for HoldingsCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let config = self.pipeline.config();
        f.debug_struct("HoldingsCoordinator")
            .field("account_id", &config.account_id)
            .field("account_currency", &config.account_currency)
            .field("positions", &self.get_snapshot().map(|s| s.len()))
            .field("running", &self.scheduler.is_running())
            .finish()
    }
}

impl HoldingsCoordinator {
    pub fn new(provider: Arc<dyn BrokerProvider>, config: CoordinatorConfig) -> Self {
        Self::from_pipeline(RefreshPipeline::new(provider, config))
    }

    /// Map raw form options and build a coordinator from them.
    pub fn from_options(
        provider: Arc<dyn BrokerProvider>,
        options: &RawOptions,
    ) -> Result<Self, CoreError> {
        Ok(Self::new(provider, CoordinatorConfig::from_options(options)?))
    }

    pub fn from_pipeline(pipeline: RefreshPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            policy: Arc::new(PollingPolicy::new()),
            scheduler: Box::new(IntervalScheduler::new()),
        }
    }

    pub fn with_policy(mut self, policy: PollingPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Box<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    // ── Configuration ───────────────────────────────────────────────

    pub fn config(&self) -> Arc<CoordinatorConfig> {
        self.pipeline.config()
    }

    /// Replace the configuration with newly submitted options.
    ///
    /// The cached session is dropped so new credentials take effect on the
    /// next refresh, and a changed update interval re-arms the timer at once.
    /// A refresh already in flight finishes with the configuration it started
    /// with. The discovered account currency carries over when the new
    /// options do not state one and the account is unchanged.
    pub fn update_config(&self, options: &RawOptions) -> Result<(), CoreError> {
        let mut config = CoordinatorConfig::from_options(options)?;
        let current = self.pipeline.config();
        if config.account_currency.is_none() && config.account_id == current.account_id {
            config.account_currency = current.account_currency.clone();
        }

        let account_id = config.account_id;
        let interval = config.update_interval;
        self.pipeline.replace_config(config);
        self.scheduler.set_interval(interval);
        info!(account_id, ?interval, "Coordinator configuration updated");
        Ok(())
    }

    /// Lowercase account currency, once discovered.
    pub fn account_currency(&self) -> Option<String> {
        self.pipeline.account_currency()
    }

    // ── Holdings ────────────────────────────────────────────────────

    pub fn get_snapshot(&self) -> Option<Arc<HoldingsSnapshot>> {
        self.pipeline.get_snapshot()
    }

    pub fn lookup(&self, symbol: &str) -> Option<Position> {
        self.pipeline.lookup(symbol)
    }

    /// Register a listener called after every successful refresh.
    pub fn subscribe(&self, listener: Arc<dyn SnapshotListener>) {
        self.pipeline.subscribe(listener);
    }

    // ── Remote operations ───────────────────────────────────────────

    /// Validate credentials and discover the account currency.
    /// Errors are returned as-is so the caller can show them next to the form.
    pub async fn setup(&self) -> Result<AccountDetails, CoreError> {
        self.pipeline.discover_account_currency().await
    }

    pub async fn get_account_details(&self) -> Result<AccountDetails, CoreError> {
        self.pipeline.get_account_details().await
    }

    /// Refresh right now, bypassing the polling policy.
    pub async fn refresh(&self) -> Result<Arc<HoldingsSnapshot>, CoreError> {
        self.pipeline.refresh().await
    }

    /// One scheduler tick: ask the polling policy, refresh if it agrees.
    /// Never fails; errors are logged and reported in the outcome.
    pub async fn tick(&self) -> TickOutcome {
        run_tick(&self.pipeline, &self.policy).await
    }

    // ── Scheduling ──────────────────────────────────────────────────

    /// Start ticking at the configured update interval.
    pub fn start(&self) {
        let pipeline = self.pipeline.clone();
        let policy = self.policy.clone();
        let callback: TickCallback = Arc::new(move || {
            let pipeline = pipeline.clone();
            let policy = policy.clone();
            async move {
                run_tick(&pipeline, &policy).await;
            }
            .boxed()
        });
        self.scheduler
            .start(self.pipeline.config().update_interval, callback);
    }

    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Tick as soon as possible instead of waiting for the timer.
    pub fn trigger_now(&self) {
        self.scheduler.trigger_now();
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }
}

async fn run_tick(pipeline: &RefreshPipeline, policy: &PollingPolicy) -> TickOutcome {
    let config = pipeline.config();
    let decision = policy.decide(pipeline.has_snapshot(), Utc::now(), &config);

    if !decision.should_fetch() {
        debug!(
            %decision,
            start = %config.trading_window.start,
            stop = %config.trading_window.stop,
            "Not querying broker"
        );
        return TickOutcome::Skipped(decision);
    }

    debug!(%decision, "Querying broker");
    match pipeline.refresh().await {
        Ok(snapshot) => TickOutcome::Refreshed {
            decision,
            positions: snapshot.len(),
        },
        Err(err) => {
            if err.is_transient() {
                warn!(error = %err, "Holdings refresh failed, retrying on next tick");
            } else {
                error!(error = %err, "Holdings refresh failed");
            }
            TickOutcome::Failed {
                decision,
                error: err,
            }
        }
    }
}
