use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::CoreError;
use crate::models::account::AccountInfo;
use crate::models::config::Credentials;
use crate::models::position::RawPosition;

/// Factory for broker HTTP contexts.
///
/// Each context owns its own cookie jar; logging in through a context turns it
/// into an authenticated session. The session manager decides when a new
/// context is needed, the provider only knows how to talk to the broker.
pub trait BrokerProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Create a fresh, unauthenticated context.
    fn new_context(&self) -> Result<Arc<dyn BrokerContext>, CoreError>;
}

/// One HTTP context (cookie jar + connection pool) against the broker.
#[async_trait]
pub trait BrokerContext: Send + Sync {
    /// Login step 1: visit the login page to pick up baseline cookies.
    /// Non-success statuses fail with `CoreError::Authentication`.
    async fn visit_login_page(&self) -> Result<(), CoreError>;

    /// Login step 2: post the credentials.
    /// Non-success statuses fail with `CoreError::Authentication`.
    async fn submit_credentials(&self, credentials: &Credentials) -> Result<(), CoreError>;

    /// Account metadata. Non-success statuses fail with `CoreError::Fetch`.
    async fn account_info(&self, account_id: i64) -> Result<Vec<AccountInfo>, CoreError>;

    /// Current holdings. Non-success statuses fail with `CoreError::Fetch`.
    async fn positions(&self, account_id: i64) -> Result<Vec<RawPosition>, CoreError>;
}
