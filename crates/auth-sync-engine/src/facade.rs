//! Side-effecting provider calls invoked by the synchronization context.

use crate::error::SyncResult;
use async_trait::async_trait;
use std::fmt;

/// DataBackend credential minted by the token exchange endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token([REDACTED; {} bytes])", self.0.len())
    }
}

/// Trait for the three provider operations the engine depends on.
///
/// Implementors wrap the token exchange endpoint and the DataBackend's own
/// session API. Every call may fail; failures are recorded by the engine and
/// never terminate the synchronization context.
#[async_trait]
pub trait ProviderFacade: Send + Sync {
    /// Calls the token exchange endpoint with the current IdP credentials.
    async fn request_token(&self) -> SyncResult<Token>;

    /// Establishes a DataBackend session from a minted token.
    async fn sign_in(&self, token: Token) -> SyncResult<()>;

    /// Best-effort teardown of the DataBackend session.
    async fn sign_out(&self) -> SyncResult<()>;
}
