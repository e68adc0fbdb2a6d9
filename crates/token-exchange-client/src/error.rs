//! Token exchange client error types.

use auth_sync_engine::SyncError;
use thiserror::Error;

/// Token exchange client error type.
#[derive(Error, Debug)]
pub enum ExchangeClientError {
    /// Endpoint found no valid IdP session (HTTP 401)
    #[error("Not signed in: {0}")]
    Unauthorized(String),

    /// Any other non-200 response
    #[error("Token exchange returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// 200 response without a usable token
    #[error("Malformed token exchange response: {0}")]
    Malformed(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ExchangeClientError {
    /// Returns true if this error is transient and the request can be retried.
    ///
    /// Transient errors include:
    /// - Connection failures and timeouts
    /// - 5xx responses
    pub fn is_transient(&self) -> bool {
        match self {
            ExchangeClientError::Status { status, .. } => (500..600).contains(status),
            ExchangeClientError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }
}

impl From<ExchangeClientError> for SyncError {
    fn from(err: ExchangeClientError) -> Self {
        match err {
            ExchangeClientError::Unauthorized(_) => SyncError::Unauthenticated,
            other => SyncError::TokenExchangeFailed(other.to_string()),
        }
    }
}

/// Result type alias using ExchangeClientError.
pub type ExchangeClientResult<T> = Result<T, ExchangeClientError>;

/// Failure reported by the DataBackend's own session API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendSessionError {
    #[error("token rejected: {0}")]
    Rejected(String),

    #[error("DataBackend unavailable: {0}")]
    Unavailable(String),
}
