//! ProviderFacade over HTTP token exchange and a DataBackend session.

use crate::client::TokenExchangeClient;
use crate::credentials::IdpCredentialSource;
use crate::error::BackendSessionError;
use async_trait::async_trait;
use auth_sync_engine::{ProviderFacade, SyncError, SyncResult, Token};
use std::sync::Arc;
use tracing::{debug, warn};

/// Trait for the DataBackend's own session API.
///
/// Implementors wrap the DataBackend SDK. Signing in must replace any
/// existing session; the DataBackend observer reports the result.
#[async_trait]
pub trait BackendSession: Send + Sync {
    async fn sign_in_with_token(&self, token: &str) -> Result<(), BackendSessionError>;

    async fn sign_out(&self) -> Result<(), BackendSessionError>;
}

/// Provider facade combining the token exchange client, an IdP credential
/// source and a DataBackend session.
pub struct HttpProviderFacade<B> {
    client: TokenExchangeClient,
    credentials: Arc<dyn IdpCredentialSource>,
    backend: B,
}

impl<B: BackendSession> HttpProviderFacade<B> {
    pub fn new(
        client: TokenExchangeClient,
        credentials: Arc<dyn IdpCredentialSource>,
        backend: B,
    ) -> Self {
        Self {
            client,
            credentials,
            backend,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<B: BackendSession> ProviderFacade for HttpProviderFacade<B> {
    async fn request_token(&self) -> SyncResult<Token> {
        let credentials = self.credentials.credentials().await;
        self.client.request_token(&credentials).await.map_err(|e| {
            warn!(error = %e, transient = e.is_transient(), "Token exchange request failed");
            SyncError::from(e)
        })
    }

    async fn sign_in(&self, token: Token) -> SyncResult<()> {
        debug!("Signing in to DataBackend with exchanged token");
        self.backend
            .sign_in_with_token(token.as_str())
            .await
            .map_err(|e| SyncError::BackendSignInRejected(e.to_string()))
    }

    async fn sign_out(&self) -> SyncResult<()> {
        self.backend
            .sign_out()
            .await
            .map_err(|e| SyncError::BackendSignOutFailed(e.to_string()))
    }
}
