//! IdP credentials attached to token exchange requests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;

/// How the IdP session is presented to the token exchange endpoint.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum ExchangeCredentials {
    /// Rely on the client's cookie store.
    #[default]
    Ambient,
    /// Raw `Cookie` header value.
    Cookie(String),
    /// IdP access token sent as `Authorization: Bearer`, for contexts where
    /// cookies are unavailable.
    Bearer(String),
}

impl fmt::Debug for ExchangeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeCredentials::Ambient => f.write_str("Ambient"),
            ExchangeCredentials::Cookie(_) => f.write_str("Cookie([REDACTED])"),
            ExchangeCredentials::Bearer(_) => f.write_str("Bearer([REDACTED])"),
        }
    }
}

/// Trait for supplying IdP credentials at request time.
#[async_trait]
pub trait IdpCredentialSource: Send + Sync {
    async fn credentials(&self) -> ExchangeCredentials;
}

/// Fixed credentials.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(ExchangeCredentials);

impl StaticCredentials {
    pub fn new(credentials: ExchangeCredentials) -> Self {
        Self(credentials)
    }
}

#[async_trait]
impl IdpCredentialSource for StaticCredentials {
    async fn credentials(&self) -> ExchangeCredentials {
        self.0.clone()
    }
}

/// Credentials updated at runtime, e.g. after the IdP refreshes its access
/// token. Falls back to [`ExchangeCredentials::Ambient`] when cleared.
#[derive(Debug, Default)]
pub struct SharedCredentials {
    current: RwLock<Option<ExchangeCredentials>>,
}

impl SharedCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, credentials: ExchangeCredentials) {
        *self.current.write() = Some(credentials);
    }

    pub fn clear(&self) {
        *self.current.write() = None;
    }
}

#[async_trait]
impl IdpCredentialSource for SharedCredentials {
    async fn credentials(&self) -> ExchangeCredentials {
        self.current.read().clone().unwrap_or_default()
    }
}
