//! Token exchange endpoint error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Token exchange error type.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// No valid IdP session via either credential path
    #[error("Unauthorized: No IdP session found")]
    Unauthorized,

    /// The verified identity lacks a field needed to mint a token
    #[error("Verified identity is missing a required field")]
    MissingField(&'static str),

    /// Minted token is bound to a different user than the IdP session
    #[error("Minted token user {minted_user} does not match IdP user {idp_user}")]
    IdentityMismatch {
        idp_user: String,
        minted_user: String,
    },

    /// IdP session lookup failed (not a rejection)
    #[error("IdP verification failed: {0}")]
    Verification(String),

    /// DataBackend admin API failed to mint a token
    #[error("Token minting failed: {0}")]
    Minting(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using ExchangeError.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Error body returned by the endpoint.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ExchangeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ExchangeError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body sent to the caller. Internal failures are not described beyond a
    /// generic message.
    fn body(&self) -> ErrorBody {
        match self {
            ExchangeError::Unauthorized | ExchangeError::MissingField(_) => ErrorBody {
                error: self.to_string(),
                details: match self {
                    ExchangeError::MissingField(field) => Some((*field).to_string()),
                    _ => None,
                },
            },
            ExchangeError::IdentityMismatch { .. } => ErrorBody {
                error: "Failed to generate authentication token".to_string(),
                details: Some("identity parity check failed".to_string()),
            },
            _ => ErrorBody {
                error: "Failed to generate authentication token".to_string(),
                details: None,
            },
        }
    }
}

impl IntoResponse for ExchangeError {
    fn into_response(self) -> Response {
        if self.status().is_server_error() {
            tracing::error!(error = %self, "Token exchange failed");
        } else {
            tracing::debug!(error = %self, "Token exchange rejected");
        }
        (self.status(), Json(self.body())).into_response()
    }
}
