use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

use crate::models::config::{CoordinatorConfig, TradingWindow};

/// Why a scheduler tick does or does not hit the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    /// Nothing has been fetched yet.
    ColdStart,
    /// Weekday, inside the trading window.
    InsideWindow,
    /// Outside the window, but picked by the random sample.
    OffWindowSample,
    /// Outside the window; nothing will have changed.
    Skip,
}

impl PollDecision {
    pub fn should_fetch(self) -> bool {
        !matches!(self, PollDecision::Skip)
    }
}

impl std::fmt::Display for PollDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollDecision::ColdStart => write!(f, "no local holdings yet"),
            PollDecision::InsideWindow => write!(f, "inside trading window"),
            PollDecision::OffWindowSample => write!(f, "outside trading window, sampled anyway"),
            PollDecision::Skip => write!(f, "outside trading window"),
        }
    }
}

/// Decide whether a fetch is worth making.
///
/// Approximate on purpose: there is no holiday calendar, so holidays are
/// treated like any weekday, and outside the window the broker is still polled
/// with probability `off_window_probability` to keep data moderately fresh.
pub fn decide<R: Rng>(
    has_snapshot: bool,
    now: DateTime<Utc>,
    window: &TradingWindow,
    off_window_probability: f64,
    rng: &mut R,
) -> PollDecision {
    if !has_snapshot {
        return PollDecision::ColdStart;
    }
    if window.contains(now) {
        return PollDecision::InsideWindow;
    }
    let p = if (0.0..=1.0).contains(&off_window_probability) {
        off_window_probability
    } else {
        0.0
    };
    if rng.gen_bool(p) {
        PollDecision::OffWindowSample
    } else {
        PollDecision::Skip
    }
}

/// Boolean form of [`decide`].
pub fn should_fetch<R: Rng>(
    has_snapshot: bool,
    now: DateTime<Utc>,
    window: &TradingWindow,
    off_window_probability: f64,
    rng: &mut R,
) -> bool {
    decide(has_snapshot, now, window, off_window_probability, rng).should_fetch()
}

/// [`decide`] bundled with its own randomness source.
pub struct PollingPolicy {
    rng: Mutex<StdRng>,
}

impl PollingPolicy {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sampling, for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn decide(
        &self,
        has_snapshot: bool,
        now: DateTime<Utc>,
        config: &CoordinatorConfig,
    ) -> PollDecision {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        decide(
            has_snapshot,
            now,
            &config.trading_window,
            config.off_window_probability,
            &mut *rng,
        )
    }
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self::new()
    }
}
