use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of the broker's account-info response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub account_currency: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Account metadata discovered at setup time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDetails {
    /// Lowercase ISO currency code.
    pub account_currency: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<AccountInfo> for AccountDetails {
    fn from(info: AccountInfo) -> Self {
        Self {
            account_currency: info.account_currency.to_lowercase(),
            extra: info.extra,
        }
    }
}
