//! Client side of the token exchange.
//!
//! - [`TokenExchangeClient`]: POSTs to the token exchange endpoint with the
//!   IdP credentials (ambient cookie store, explicit cookie, or bearer
//!   fallback) and parses `{"token": ...}`
//! - [`IdpCredentialSource`]: supplies those credentials at request time
//! - [`BackendSession`]: the DataBackend SDK boundary
//! - [`HttpProviderFacade`]: the engine's `ProviderFacade` built from the three

mod client;
mod credentials;
mod error;
mod facade;

pub use client::TokenExchangeClient;
pub use credentials::{ExchangeCredentials, IdpCredentialSource, SharedCredentials, StaticCredentials};
pub use error::{BackendSessionError, ExchangeClientError, ExchangeClientResult};
pub use facade::{BackendSession, HttpProviderFacade};
