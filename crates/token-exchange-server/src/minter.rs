//! DataBackend token minting through the admin API.

use crate::error::{ExchangeError, ExchangeResult};
use crate::verifier::api_url;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Who to mint a DataBackend token for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MintRequest {
    #[serde(rename = "id")]
    pub user_id: String,
    pub email: String,
}

/// A DataBackend token and the user it is bound to.
#[derive(Clone, PartialEq, Eq)]
pub struct MintedToken {
    pub token: String,
    pub user_id: String,
}

impl fmt::Debug for MintedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MintedToken")
            .field("token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[async_trait]
pub trait BackendTokenMinter: Send + Sync {
    async fn mint(&self, request: &MintRequest) -> ExchangeResult<MintedToken>;
}

#[derive(Debug, Deserialize)]
struct MintResponse {
    user: MintedUser,
}

#[derive(Debug, Deserialize)]
struct MintedUser {
    id: String,
    refresh_token: String,
}

/// Minter backed by the DataBackend admin API.
pub struct HttpBackendTokenMinter {
    http_client: reqwest::Client,
    mint_url: Url,
    admin_token: String,
    app_id: Option<String>,
}

impl HttpBackendTokenMinter {
    pub fn new(
        backend_url: &str,
        admin_token: impl Into<String>,
        app_id: Option<String>,
        timeout: Duration,
    ) -> ExchangeResult<Self> {
        let mint_url = api_url(backend_url, "admin/refresh_tokens")?;
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            mint_url,
            admin_token: admin_token.into(),
            app_id,
        })
    }
}

#[async_trait]
impl BackendTokenMinter for HttpBackendTokenMinter {
    async fn mint(&self, request: &MintRequest) -> ExchangeResult<MintedToken> {
        let mut http_request = self
            .http_client
            .post(self.mint_url.clone())
            .bearer_auth(&self.admin_token)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(request);
        if let Some(app_id) = &self.app_id {
            http_request = http_request.header("app-id", app_id);
        }

        let response = http_request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExchangeError::Minting(format!(
                "admin API returned HTTP {}",
                status.as_u16()
            )));
        }

        let parsed: MintResponse = response
            .json()
            .await
            .map_err(|e| ExchangeError::Minting(format!("malformed admin response: {}", e)))?;
        if parsed.user.refresh_token.is_empty() {
            return Err(ExchangeError::Minting("admin API returned an empty token".to_string()));
        }

        Ok(MintedToken {
            token: parsed.user.refresh_token,
            user_id: parsed.user.id,
        })
    }
}
