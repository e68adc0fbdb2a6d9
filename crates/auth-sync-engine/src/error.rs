//! Synchronization error types.

use serde::Serialize;
use thiserror::Error;

/// Failure of a corrective action.
///
/// Every variant is non-fatal: it is recorded as the context's last error and
/// either retried on the next trigger or left as an observable state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The token exchange endpoint found no valid IdP session.
    #[error("Not signed in")]
    Unauthenticated,

    /// Network failure, non-2xx status, or malformed response from the
    /// token exchange endpoint.
    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// The DataBackend rejected a syntactically valid token.
    #[error("DataBackend rejected sign-in: {0}")]
    BackendSignInRejected(String),

    /// Best-effort DataBackend sign-out did not complete.
    #[error("DataBackend sign-out failed: {0}")]
    BackendSignOutFailed(String),
}

/// Machine-readable discriminant of [`SyncError`], for UI and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    Unauthenticated,
    TokenExchangeFailed,
    BackendSignInRejected,
    BackendSignOutFailed,
}

impl SyncError {
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            SyncError::Unauthenticated => SyncErrorKind::Unauthenticated,
            SyncError::TokenExchangeFailed(_) => SyncErrorKind::TokenExchangeFailed,
            SyncError::BackendSignInRejected(_) => SyncErrorKind::BackendSignInRejected,
            SyncError::BackendSignOutFailed(_) => SyncErrorKind::BackendSignOutFailed,
        }
    }

    /// Returns true if a bounded retry policy may re-attempt after this error.
    ///
    /// `Unauthenticated` needs a new IdP session, so retrying cannot help.
    /// Sign-out failures never block progress and are not retried either.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::TokenExchangeFailed(_) | SyncError::BackendSignInRejected(_)
        )
    }
}

/// Result type alias using SyncError.
pub type SyncResult<T> = Result<T, SyncError>;

/// A report arrived that the phase machine cannot accept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid sync phase transition: cannot apply {input} in phase {phase}")]
    Invalid { input: String, phase: String },

    #[error("Synchronization context has been torn down")]
    TornDown,
}
