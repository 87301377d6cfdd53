use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::CoreError;
use crate::models::account::AccountInfo;
use crate::models::config::Credentials;
use crate::models::position::RawPosition;
use super::traits::{BrokerContext, BrokerProvider};

pub const BASE_URL: &str = "https://www.nordnet.dk";

/// Client identification headers sent with every API call.
pub const CLIENT_HEADERS: [(&str, &str); 2] = [("client-id", "NEXT"), ("sub-client-id", "NEXT")];

/// Socket-level backstop; the refresh pipeline applies its own tighter bound.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Nordnet web API provider.
///
/// - **Auth**: cookie based. Visit `/logind`, then post the credentials as a
///   form to `/api/2/authentication/basic/login`.
/// - **Endpoints**: `/api/2/accounts/{id}/info`, `/api/2/accounts/{id}/positions`
///
/// The base URL defaults to the Danish site; other Nordnet domains
/// (`nordnet.se`, `nordnet.no`, `nordnet.fi`) serve the same API.
pub struct NordnetProvider {
    base_url: String,
}

impl NordnetProvider {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn login_page_url(&self) -> String {
        format!("{}/logind", self.base_url)
    }

    pub fn login_url(&self) -> String {
        format!("{}/api/2/authentication/basic/login", self.base_url)
    }

    pub fn account_info_url(&self, account_id: i64) -> String {
        format!("{}/api/2/accounts/{account_id}/info", self.base_url)
    }

    pub fn positions_url(&self, account_id: i64) -> String {
        format!("{}/api/2/accounts/{account_id}/positions", self.base_url)
    }
}

impl Default for NordnetProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerProvider for NordnetProvider {
    fn name(&self) -> &str {
        "Nordnet"
    }

    fn new_context(&self) -> Result<Arc<dyn BrokerContext>, CoreError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CoreError::Unknown(format!("Failed to build HTTP client: {e}")))?;

        Ok(Arc::new(NordnetContext {
            client,
            endpoints: NordnetProvider::with_base_url(self.base_url.clone()),
        }))
    }
}

/// A cookie-carrying HTTP client bound to one Nordnet site.
struct NordnetContext {
    client: Client,
    endpoints: NordnetProvider,
}

impl NordnetContext {
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, CoreError> {
        let resp = with_client_headers(self.client.get(url)).send().await?;
        fetch_status(resp.status())?;
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl BrokerContext for NordnetContext {
    async fn visit_login_page(&self) -> Result<(), CoreError> {
        let resp = self.client.get(self.endpoints.login_page_url()).send().await?;
        login_status(resp.status())?;
        // Only the cookies matter; drain the body so the connection is reusable.
        resp.text().await?;
        Ok(())
    }

    async fn submit_credentials(&self, credentials: &Credentials) -> Result<(), CoreError> {
        let form = [
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
        ];
        let resp = with_client_headers(self.client.post(self.endpoints.login_url()))
            .form(&form)
            .send()
            .await?;
        login_status(resp.status())?;
        resp.text().await?;
        Ok(())
    }

    async fn account_info(&self, account_id: i64) -> Result<Vec<AccountInfo>, CoreError> {
        self.get_json(&self.endpoints.account_info_url(account_id)).await
    }

    async fn positions(&self, account_id: i64) -> Result<Vec<RawPosition>, CoreError> {
        self.get_json(&self.endpoints.positions_url(account_id)).await
    }
}

fn with_client_headers(builder: RequestBuilder) -> RequestBuilder {
    CLIENT_HEADERS
        .iter()
        .fold(builder, |b, (name, value)| b.header(*name, *value))
}

/// Map a login-step status onto the error taxonomy.
pub fn login_status(status: StatusCode) -> Result<(), CoreError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(CoreError::Authentication {
            status: status.as_u16(),
        })
    }
}

/// Map a data-endpoint status onto the error taxonomy.
pub fn fetch_status(status: StatusCode) -> Result<(), CoreError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(CoreError::Fetch {
            status: status.as_u16(),
        })
    }
}
