//! Token exchange HTTP client.

use crate::credentials::ExchangeCredentials;
use crate::error::{ExchangeClientError, ExchangeClientResult};
use auth_sync_engine::Token;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    details: Option<String>,
}

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Error message from a `{"error", "details"?}` body, or a digest of the raw
/// body when it is not in that shape.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse {
            error,
            details: Some(details),
        }) => format!("{} ({})", error, details),
        Ok(ErrorResponse { error, .. }) => error,
        Err(_) => summarize_response_body(body),
    }
}

/// Client for the token exchange endpoint.
#[derive(Clone)]
pub struct TokenExchangeClient {
    http_client: reqwest::Client,
    endpoint: Url,
    cookies: Arc<Jar>,
}

impl TokenExchangeClient {
    /// Create a client with its own cookie store and a request timeout.
    pub fn new(endpoint: Url, timeout: Duration) -> ExchangeClientResult<Self> {
        let cookies = Arc::new(Jar::default());
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_provider(cookies.clone())
            .build()?;
        Ok(Self {
            http_client,
            endpoint,
            cookies,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Store a `Set-Cookie`-style cookie for the endpoint's origin, used by
    /// [`ExchangeCredentials::Ambient`] requests.
    pub fn add_cookie(&self, cookie: &str) {
        self.cookies.add_cookie_str(cookie, &self.endpoint);
    }

    /// Exchange the IdP session for a DataBackend token.
    pub async fn request_token(
        &self,
        credentials: &ExchangeCredentials,
    ) -> ExchangeClientResult<Token> {
        let mut request = self
            .http_client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");

        request = match credentials {
            ExchangeCredentials::Ambient => request,
            ExchangeCredentials::Cookie(cookie) => request.header(COOKIE, cookie.as_str()),
            ExchangeCredentials::Bearer(token) => request.bearer_auth(token),
        };

        tracing::debug!(endpoint = %self.endpoint, ?credentials, "Requesting DataBackend token");

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(ExchangeClientError::Unauthorized(error_message(&body)));
        }

        if status != StatusCode::OK {
            let message = error_message(&body);
            tracing::warn!(status = %status, message = %message, "Token exchange failed");
            return Err(ExchangeClientError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ExchangeClientError::Malformed(format!("{} ({})", e, summarize_response_body(&body)))
        })?;

        if parsed.token.trim().is_empty() {
            return Err(ExchangeClientError::Malformed("empty token".to_string()));
        }

        Ok(Token::new(parsed.token))
    }
}
