use chrono::{DateTime, Datelike, NaiveTime, TimeDelta, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::errors::CoreError;

// ── Form defaults ───────────────────────────────────────────────────

pub const DEFAULT_ACCOUNT_ID: i64 = 1;

/// Covers most of the European and American markets.
pub const DEFAULT_TRADING_START_TIME: &str = "09:00:00";
pub const DEFAULT_TRADING_STOP_TIME: &str = "23:00:00";

pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 30;

/// Session lifetime pre-filled by the setup form.
///
/// Misleading: it is never used. Broker sessions expire after one hour, so
/// the mapper always applies [`SESSION_LIFETIME_MINUTES`] instead.
pub const FORM_DEFAULT_SESSION_LIFETIME_HOURS: i64 = 24;

/// Sessions are renewed a little before the broker's one hour expiry.
pub const SESSION_LIFETIME_MINUTES: i64 = 55;

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Copenhagen;

/// Chance of polling anyway outside the trading window (1 in 11).
pub const DEFAULT_OFF_WINDOW_PROBABILITY: f64 = 1.0 / 11.0;

// ── Raw form input ──────────────────────────────────────────────────

/// A duration as emitted by the form's duration picker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationInput {
    #[serde(default)]
    pub days: u64,
    #[serde(default)]
    pub hours: u64,
    #[serde(default)]
    pub minutes: u64,
    #[serde(default)]
    pub seconds: u64,
}

impl DurationInput {
    pub fn from_secs(seconds: u64) -> Self {
        Self {
            seconds,
            ..Self::default()
        }
    }

    /// Total length. Fails when the parts do not fit in a `u64` of seconds.
    pub fn to_duration(&self) -> Result<Duration, CoreError> {
        [
            (self.days, 86_400),
            (self.hours, 3_600),
            (self.minutes, 60),
            (self.seconds, 1),
        ]
        .into_iter()
        .try_fold(0u64, |total, (part, unit)| {
            part.checked_mul(unit)?.checked_add(total)
        })
        .map(Duration::from_secs)
        .ok_or_else(|| CoreError::Configuration(format!("Duration out of range: {self:?}")))
    }
}

/// Untyped options exactly as supplied by the configuration layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOptions {
    pub username: String,
    pub password: String,
    /// Number widgets hand over floats (`1.0`), text fields hand over strings.
    pub account_id: Value,
    pub trading_start_time: String,
    pub trading_stop_time: String,
    pub update_interval: DurationInput,
    /// Accepted for compatibility with stored entries, then overridden.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_lifetime: Option<DurationInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub off_window_probability: Option<f64>,
}

impl RawOptions {
    /// Options for the given credentials with every other field at its form default.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            account_id: Value::from(DEFAULT_ACCOUNT_ID),
            trading_start_time: DEFAULT_TRADING_START_TIME.to_string(),
            trading_stop_time: DEFAULT_TRADING_STOP_TIME.to_string(),
            update_interval: DurationInput::from_secs(DEFAULT_UPDATE_INTERVAL_SECS),
            session_lifetime: None,
            account_currency: None,
            timezone: None,
            off_window_probability: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        serde_json::from_str(json).map_err(|e| CoreError::Configuration(e.to_string()))
    }
}

// ── Typed configuration ─────────────────────────────────────────────

/// Broker login credentials. The password never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Daily trading hours, Monday to Friday, in one reference timezone.
///
/// The window is half-open: `start <= t < stop`. A window whose start is not
/// before its stop is empty; there is no overnight wrap-around.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradingWindow {
    pub start: NaiveTime,
    pub stop: NaiveTime,
    pub timezone: Tz,
}

impl TradingWindow {
    pub fn is_trading_day(day: Weekday) -> bool {
        !matches!(day, Weekday::Sat | Weekday::Sun)
    }

    /// Whether `now` is on a weekday and inside the daily trading hours.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);
        if !Self::is_trading_day(local.weekday()) {
            return false;
        }
        let t = local.time();
        self.start <= t && t < self.stop
    }
}

/// Coordinator configuration converted into native types.
///
/// Never mutated in place: updates build a new value which is swapped in whole.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    pub credentials: Credentials,
    pub account_id: i64,
    /// Lowercase ISO code, discovered from the broker once at setup.
    pub account_currency: Option<String>,
    pub trading_window: TradingWindow,
    pub update_interval: Duration,
    pub session_lifetime: TimeDelta,
    pub off_window_probability: f64,
}

impl CoordinatorConfig {
    /// Validate and convert raw form options.
    pub fn from_options(options: &RawOptions) -> Result<Self, CoreError> {
        let account_id = parse_account_id(&options.account_id)?;
        let timezone = match options.timezone.as_deref() {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| CoreError::Configuration(format!("Unknown timezone '{name}'")))?,
            None => DEFAULT_TIMEZONE,
        };

        let trading_window = TradingWindow {
            start: parse_time_of_day("trading_start_time", &options.trading_start_time)?,
            stop: parse_time_of_day("trading_stop_time", &options.trading_stop_time)?,
            timezone,
        };

        let update_interval = options.update_interval.to_duration()?;
        if update_interval.is_zero() {
            return Err(CoreError::Configuration(
                "update_interval must be greater than zero".into(),
            ));
        }

        let off_window_probability = options
            .off_window_probability
            .unwrap_or(DEFAULT_OFF_WINDOW_PROBABILITY);
        if !(0.0..=1.0).contains(&off_window_probability) {
            return Err(CoreError::Configuration(format!(
                "off_window_probability must be between 0 and 1, got {off_window_probability}"
            )));
        }

        if options.session_lifetime.is_some() {
            tracing::debug!(
                minutes = SESSION_LIFETIME_MINUTES,
                "Ignoring configured session_lifetime, broker sessions expire after one hour"
            );
        }

        Ok(Self {
            credentials: Credentials {
                username: options.username.clone(),
                password: options.password.clone(),
            },
            account_id,
            account_currency: options
                .account_currency
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_lowercase),
            trading_window,
            update_interval,
            session_lifetime: TimeDelta::minutes(SESSION_LIFETIME_MINUTES),
            off_window_probability,
        })
    }

    /// A copy of this configuration with the discovered account currency merged in.
    pub fn with_account_currency(&self, currency: &str) -> Self {
        Self {
            account_currency: Some(currency.to_lowercase()),
            ..self.clone()
        }
    }
}

fn parse_account_id(value: &Value) -> Result<i64, CoreError> {
    let invalid = || CoreError::Configuration(format!("account_id must be an integer, got {value}"));
    match value {
        Value::Number(n) => {
            if let Some(id) = n.as_i64() {
                return Ok(id);
            }
            match n.as_f64() {
                Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                    Ok(f as i64)
                }
                _ => Err(invalid()),
            }
        }
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn parse_time_of_day(field: &str, input: &str) -> Result<NaiveTime, CoreError> {
    let input = input.trim();
    NaiveTime::parse_from_str(input, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M"))
        .map_err(|_| CoreError::Configuration(format!("{field} is not a valid time: '{input}'")))
}
