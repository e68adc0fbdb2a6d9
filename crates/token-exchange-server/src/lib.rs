//! Token exchange endpoint.
//!
//! Verifies the caller's IdP session server-side and mints a DataBackend
//! token whose embedded user id is the IdP user id.

mod credential;
mod error;
mod minter;
mod router;
mod verifier;

pub use credential::{extract_credentials, IdpCredential};
pub use error::{ExchangeError, ExchangeResult};
pub use minter::{BackendTokenMinter, HttpBackendTokenMinter, MintRequest, MintedToken};
pub use router::{router, serve, ExchangeState};
pub use verifier::{HttpIdpVerifier, IdpSessionVerifier, VerifiedIdentity};
