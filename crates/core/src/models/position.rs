use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw position fields that carry no information for consumers.
pub const IGNORED_FIELDS: [&str; 3] = ["is_custom_gav", "margin_percent", "pawn_percent"];

/// A `{currency, value}` pair as the broker nests every price field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    #[serde(default)]
    pub currency: String,
    pub value: f64,
}

/// The traded instrument. Fields beyond symbol and name are passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One element of the broker's positions response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPosition {
    pub accno: i64,
    pub accid: i64,
    pub instrument: Instrument,
    pub main_market_price: Amount,
    pub morning_price: Amount,
    pub acq_price: Amount,
    pub acq_price_acc: Amount,
    pub market_value: Amount,
    pub market_value_acc: Amount,
    pub qty: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A normalized holding of one symbol.
///
/// `position_*` fields are in the instrument's native currency, `account_*`
/// fields in the account currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: Instrument,
    /// Lowercase native currency of the instrument (e.g. "usd", "nok").
    pub position_currency: String,
    /// Lowercase currency of the account the position is held in.
    pub account_currency: String,
    pub account_market_value: f64,
    pub position_market_value: f64,
    pub account_acquisition_price: f64,
    pub position_acquisition_price: f64,
    pub position_morning_price: f64,
    pub position_market_price: f64,
    pub quantity: f64,
    /// Return in account currency: market value minus quantity × acquisition price.
    pub account_roi: f64,
    /// Native price change since acquisition, in percent.
    /// `None` when the acquisition price is zero.
    pub account_roi_percent: Option<f64>,
    pub account_number: i64,
    pub account_id: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Position {
    /// Normalize a raw broker position. Derived fields are always computed
    /// from the raw values passed in.
    pub fn from_raw(raw: RawPosition, account_currency: &str) -> Self {
        let RawPosition {
            accno,
            accid,
            instrument,
            main_market_price,
            morning_price,
            acq_price,
            acq_price_acc,
            market_value,
            market_value_acc,
            qty,
            mut extra,
        } = raw;

        for field in IGNORED_FIELDS {
            extra.remove(field);
        }

        Self {
            instrument,
            position_currency: main_market_price.currency.to_lowercase(),
            account_currency: account_currency.to_lowercase(),
            account_roi: account_roi(market_value_acc.value, qty, acq_price_acc.value),
            account_roi_percent: roi_percent(main_market_price.value, acq_price.value),
            account_market_value: market_value_acc.value,
            position_market_value: market_value.value,
            account_acquisition_price: acq_price_acc.value,
            position_acquisition_price: acq_price.value,
            position_morning_price: morning_price.value,
            position_market_price: main_market_price.value,
            quantity: qty,
            account_number: accno,
            account_id: accid,
            extra,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.instrument.symbol
    }

    /// Stable identifier for a consumer entity tracking this symbol,
    /// e.g. `nordnet_stock_novo_b` for "NOVO B".
    pub fn entity_id(&self) -> String {
        format!("nordnet_stock_{}", self.instrument.symbol.replace(' ', "_")).to_lowercase()
    }

    pub fn display_name(&self) -> String {
        format!(
            "Stock price for {} ({})",
            self.instrument.name, self.instrument.symbol
        )
    }
}

/// Account-currency return on investment.
pub fn account_roi(market_value_acc: f64, quantity: f64, acquisition_price_acc: f64) -> f64 {
    market_value_acc - quantity * acquisition_price_acc
}

/// Percentage change from acquisition price to market price.
pub fn roi_percent(market_price: f64, acquisition_price: f64) -> Option<f64> {
    if acquisition_price == 0.0 {
        return None;
    }
    Some((market_price - acquisition_price) / acquisition_price * 100.0)
}
