use std::time::Duration;

use thiserror::Error;

/// Unified error type for the entire nordnet-holdings-core library.
/// Every public function returns `Result<T, CoreError>`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    // ── Setup ───────────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ── Session ─────────────────────────────────────────────────────
    #[error("Authentication failed with HTTP status {status}")]
    Authentication { status: u16 },

    // ── API / Network ───────────────────────────────────────────────
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Fetch failed with HTTP status {status}")]
    Fetch { status: u16 },

    #[error("Invalid response from broker: {0}")]
    InvalidResponse(String),

    // ── Catch-all ───────────────────────────────────────────────────
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl CoreError {
    /// Whether the next scheduled refresh is expected to recover on its own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Connectivity(_)
                | CoreError::Timeout(_)
                | CoreError::Fetch { .. }
                | CoreError::InvalidResponse(_)
        )
    }

    /// Error key shown next to the username field of the setup form.
    pub fn setup_error_code(&self) -> &'static str {
        match self {
            CoreError::Connectivity(_) | CoreError::Timeout(_) => "connection_error",
            CoreError::Authentication { status } if *status > 400 && *status < 500 => "auth_error",
            CoreError::Authentication { .. } | CoreError::Fetch { .. } => "http_error",
            _ => "unknown",
        }
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::InvalidResponse(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest errors carry the full URL; never let query strings reach logs.
        let msg = redact_query(&error_chain(&e));
        if e.is_timeout() {
            CoreError::Connectivity(format!("timeout: {msg}"))
        } else if e.is_connect() || e.is_request() {
            CoreError::Connectivity(msg)
        } else if e.is_decode() || e.is_body() {
            CoreError::InvalidResponse(msg)
        } else {
            CoreError::Unknown(msg)
        }
    }
}

/// The error followed by its causes, e.g. "error sending request: connection refused".
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

/// Replace every URL query string with a marker, keeping the rest of the message.
/// A query ends at whitespace or a closing parenthesis.
pub fn redact_query(msg: &str) -> String {
    let mut out = String::with_capacity(msg.len());
    let mut rest = msg;
    while let Some(idx) = rest.find('?') {
        out.push_str(&rest[..idx]);
        out.push_str("?<query redacted>");
        let query = &rest[idx + 1..];
        let end = query
            .find(|c: char| c.is_whitespace() || c == ')')
            .unwrap_or(query.len());
        rest = &query[end..];
    }
    out.push_str(rest);
    out
}
