//! IdP session verification.

use crate::credential::IdpCredential;
use crate::error::{ExchangeError, ExchangeResult};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Identity of a verified IdP session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VerifiedIdentity {
    #[serde(rename = "id")]
    pub user_id: String,
    #[serde(default)]
    pub primary_email: Option<String>,
}

/// Verifies an IdP credential server-side.
///
/// `Ok(None)` means the credential does not carry a valid session. `Err` is
/// reserved for failures to reach or understand the IdP.
#[async_trait]
pub trait IdpSessionVerifier: Send + Sync {
    async fn verify(&self, credential: &IdpCredential) -> ExchangeResult<Option<VerifiedIdentity>>;
}

/// Resolve `path` below `base`, keeping any path prefix on `base`.
pub(crate) fn api_url(base: &str, path: &str) -> ExchangeResult<Url> {
    let mut base = Url::parse(base)?;
    if !base.path().ends_with('/') {
        let prefixed = format!("{}/", base.path());
        base.set_path(&prefixed);
    }
    Ok(base.join(path.trim_start_matches('/'))?)
}

/// Verifier backed by the IdP's current-user API.
pub struct HttpIdpVerifier {
    http_client: reqwest::Client,
    current_user_url: Url,
    session_cookie: String,
}

impl HttpIdpVerifier {
    pub fn new(idp_url: &str, session_cookie: impl Into<String>, timeout: Duration) -> ExchangeResult<Self> {
        let current_user_url = api_url(idp_url, "api/v1/users/me")?;
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            current_user_url,
            session_cookie: session_cookie.into(),
        })
    }
}

#[async_trait]
impl IdpSessionVerifier for HttpIdpVerifier {
    async fn verify(&self, credential: &IdpCredential) -> ExchangeResult<Option<VerifiedIdentity>> {
        let request = self
            .http_client
            .get(self.current_user_url.clone())
            .header(ACCEPT, "application/json");
        let request = match credential {
            IdpCredential::Bearer(token) => request.bearer_auth(token),
            IdpCredential::SessionCookie(value) => {
                request.header(COOKIE, format!("{}={}", self.session_cookie, value))
            }
        };

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::debug!(kind = credential.kind(), status = %status, "IdP rejected credential");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ExchangeError::Verification(format!(
                "IdP returned HTTP {}",
                status.as_u16()
            )));
        }

        let identity: VerifiedIdentity = response
            .json()
            .await
            .map_err(|e| ExchangeError::Verification(format!("malformed user response: {}", e)))?;
        Ok(Some(identity))
    }
}
